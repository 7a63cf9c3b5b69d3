//! Published tool schema
//!
//! Definitions use the OpenAI function format: a name, a description and a
//! JSON schema object for the parameters.

use serde_json::json;

use receptionist_core::ToolDefinition;

pub const BOOK_APPOINTMENT: &str = "book_appointment";

/// Schema for `book_appointment`
pub fn book_appointment_definition() -> ToolDefinition {
    ToolDefinition::new(
        BOOK_APPOINTMENT,
        "Book an appointment for a caller. Use this when the user wants to schedule an \
         appointment, make a booking, or reserve a time slot.",
        json!({
            "type": "object",
            "properties": {
                "caller_name": {
                    "type": "string",
                    "description": "The full name of the person booking the appointment (first and last name)"
                },
                "caller_contact_number": {
                    "type": "string",
                    "description": "The caller's phone number or contact number"
                },
                "appointment_details": {
                    "type": "string",
                    "description": "Complete details about the appointment including date, time, purpose, and any other relevant information"
                }
            },
            "required": ["caller_name", "caller_contact_number", "appointment_details"]
        }),
    )
}

/// Every tool the receptionist publishes
pub fn default_definitions() -> Vec<ToolDefinition> {
    vec![book_appointment_definition()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_book_appointment_requires_caller_fields() {
        let def = book_appointment_definition();

        assert_eq!(def.name, BOOK_APPOINTMENT);
        assert_eq!(
            def.required_arguments(),
            vec!["caller_name", "caller_contact_number", "appointment_details"]
        );
        for arg in def.required_arguments() {
            assert!(def.has_property(arg));
        }
    }
}
