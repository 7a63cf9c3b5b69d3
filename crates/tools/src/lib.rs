//! Tools the receptionist can call
//!
//! - `schema`: tool definitions published to the model
//! - `ToolHandler`: one implementation per tool
//! - `ToolDispatcher`: validated registry executing model-issued calls
//! - `BookAppointmentTool`: records appointment requests

pub mod appointment;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod schema;

use std::sync::Arc;

use receptionist_persistence::AppointmentStore;

pub use appointment::BookAppointmentTool;
pub use dispatcher::ToolDispatcher;
pub use error::ToolError;
pub use handler::{ToolHandler, DEFAULT_TOOL_TIMEOUT};
pub use schema::{book_appointment_definition, default_definitions, BOOK_APPOINTMENT};

/// Dispatcher with every published tool wired to its handler
pub fn create_dispatcher(
    company_id: i64,
    appointments: Arc<dyn AppointmentStore>,
) -> Result<ToolDispatcher, ToolError> {
    ToolDispatcher::new(
        default_definitions(),
        vec![Arc::new(BookAppointmentTool::new(company_id, appointments))],
    )
}
