//! Appointment persistence

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{PersistenceError, SupabaseClient};

/// Row to insert into the `appointments` table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewAppointment {
    pub company_id: i64,
    /// Calls are not tracked yet, so this is always null
    pub call_id: Option<String>,
    pub caller_name: String,
    pub caller_contact_number: String,
    pub appointment_details: String,
}

/// Stored appointment
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Appointment {
    pub id: i64,
    pub company_id: i64,
    pub caller_name: String,
    pub caller_contact_number: String,
    pub appointment_details: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Appointment store trait
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn create(&self, appointment: &NewAppointment) -> Result<Appointment, PersistenceError>;
}

/// `appointments` table over PostgREST
#[derive(Clone)]
pub struct SupabaseAppointmentStore {
    client: SupabaseClient,
}

impl SupabaseAppointmentStore {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AppointmentStore for SupabaseAppointmentStore {
    async fn create(&self, appointment: &NewAppointment) -> Result<Appointment, PersistenceError> {
        let rows: Vec<Appointment> = self.client.insert("appointments", appointment).await?;

        let created = rows.into_iter().next().ok_or_else(|| {
            PersistenceError::NotFound("no row returned for inserted appointment".to_string())
        })?;

        tracing::info!(
            appointment_id = created.id,
            company_id = created.company_id,
            caller_name = %created.caller_name,
            "Appointment created"
        );

        Ok(created)
    }
}
