//! `book_appointment` tool
//!
//! Records the caller's appointment request for the company the receptionist
//! answers for. Scheduling itself happens later, by staff.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use receptionist_persistence::{AppointmentStore, NewAppointment, PersistenceError};

use crate::schema::BOOK_APPOINTMENT;
use crate::{ToolError, ToolHandler};

pub struct BookAppointmentTool {
    company_id: i64,
    store: Arc<dyn AppointmentStore>,
}

impl BookAppointmentTool {
    pub fn new(company_id: i64, store: Arc<dyn AppointmentStore>) -> Self {
        Self { company_id, store }
    }
}

fn string_arg(arguments: &Value, key: &str) -> String {
    arguments
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

#[async_trait]
impl ToolHandler for BookAppointmentTool {
    fn name(&self) -> &str {
        BOOK_APPOINTMENT
    }

    async fn call(&self, arguments: Value) -> Result<Value, ToolError> {
        let appointment = NewAppointment {
            company_id: self.company_id,
            call_id: None,
            caller_name: string_arg(&arguments, "caller_name"),
            caller_contact_number: string_arg(&arguments, "caller_contact_number"),
            appointment_details: string_arg(&arguments, "appointment_details"),
        };

        tracing::info!(
            company_id = self.company_id,
            caller_name = %appointment.caller_name,
            caller_contact_number = %appointment.caller_contact_number,
            "Booking appointment"
        );
        tracing::debug!(details = %appointment.appointment_details, "Appointment details");

        match self.store.create(&appointment).await {
            Ok(created) => Ok(json!({
                "success": true,
                "appointment_id": created.id,
                "message": format!(
                    "Appointment successfully booked for {}. Confirmation number: {}",
                    appointment.caller_name, created.id
                ),
            })),
            Err(PersistenceError::NotFound(_)) => {
                tracing::error!("Failed to book appointment: no row returned");
                Err(ToolError::Execution(
                    "Failed to create appointment record".to_string(),
                ))
            }
            Err(e) => {
                tracing::error!(error = %e, "Error booking appointment");
                Err(ToolError::Execution(format!("Failed to book appointment: {}", e)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use receptionist_persistence::Appointment;

    #[derive(Default)]
    struct MemoryStore {
        rows: Mutex<Vec<NewAppointment>>,
        fail: Option<fn() -> PersistenceError>,
    }

    #[async_trait]
    impl AppointmentStore for MemoryStore {
        async fn create(
            &self,
            appointment: &NewAppointment,
        ) -> Result<Appointment, PersistenceError> {
            if let Some(fail) = self.fail {
                return Err(fail());
            }
            let mut rows = self.rows.lock();
            rows.push(appointment.clone());
            Ok(Appointment {
                id: 40 + rows.len() as i64,
                company_id: appointment.company_id,
                caller_name: appointment.caller_name.clone(),
                caller_contact_number: appointment.caller_contact_number.clone(),
                appointment_details: appointment.appointment_details.clone(),
                created_at: None,
            })
        }
    }

    fn arguments() -> Value {
        json!({
            "caller_name": "Ann Lee",
            "caller_contact_number": "555-0100",
            "appointment_details": "Cleaning, Tuesday 10am"
        })
    }

    #[tokio::test]
    async fn test_books_appointment() {
        let store = Arc::new(MemoryStore::default());
        let tool = BookAppointmentTool::new(7, store.clone());

        let payload = tool.call(arguments()).await.unwrap();

        assert_eq!(payload["success"], true);
        assert_eq!(payload["appointment_id"], 41);
        assert_eq!(
            payload["message"],
            "Appointment successfully booked for Ann Lee. Confirmation number: 41"
        );

        let rows = store.rows.lock();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].company_id, 7);
        assert_eq!(rows[0].call_id, None);
        assert_eq!(rows[0].appointment_details, "Cleaning, Tuesday 10am");
    }

    #[tokio::test]
    async fn test_missing_row() {
        let store = Arc::new(MemoryStore {
            fail: Some(|| PersistenceError::NotFound("no row".into())),
            ..Default::default()
        });
        let tool = BookAppointmentTool::new(7, store);

        let err = tool.call(arguments()).await.unwrap_err();

        assert_eq!(
            err.failure_payload()["error"],
            "Failed to create appointment record"
        );
    }

    #[tokio::test]
    async fn test_store_failure() {
        let store = Arc::new(MemoryStore {
            fail: Some(|| PersistenceError::Request("connection refused".into())),
            ..Default::default()
        });
        let tool = BookAppointmentTool::new(7, store);

        let err = tool.call(arguments()).await.unwrap_err();
        let message = err.failure_payload()["error"].as_str().unwrap().to_string();

        assert!(message.starts_with("Failed to book appointment: "));
        assert!(message.contains("connection refused"));
    }
}
