//! PostgREST persistence layer for the voice receptionist
//!
//! Provides access to:
//! - Company records (`companies`)
//! - Appointments (`appointments`)
//! - Stored procedures over `/rest/v1/rpc`, used by knowledge retrieval

pub mod appointments;
pub mod client;
pub mod companies;
pub mod error;

pub use appointments::{Appointment, AppointmentStore, NewAppointment, SupabaseAppointmentStore};
pub use client::SupabaseClient;
pub use companies::{CompanyStore, SupabaseCompanyStore};
pub use error::PersistenceError;

/// Combined persistence layer
pub struct PersistenceLayer {
    pub client: SupabaseClient,
    pub companies: SupabaseCompanyStore,
    pub appointments: SupabaseAppointmentStore,
}

/// Initialize the persistence layer from database settings
pub fn init(config: &receptionist_config::DatabaseConfig) -> Result<PersistenceLayer, PersistenceError> {
    let client = SupabaseClient::new(config)?;

    Ok(PersistenceLayer {
        companies: SupabaseCompanyStore::new(client.clone()),
        appointments: SupabaseAppointmentStore::new(client.clone()),
        client,
    })
}
