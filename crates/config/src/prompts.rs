//! System prompt assembly
//!
//! The prompt sent to the model is the company prompt followed by the
//! retrieval, appointment and voice-output instruction blocks.

/// Retrieval instructions used when the company has none of its own
pub const DEFAULT_RAG_INSTRUCTIONS: &str = "
You have access to a knowledge base of company documents.
When answering questions, relevant information from these documents will be provided to you as context.
Use this context to provide accurate, specific answers based on the company's information.
If the context doesn't contain relevant information for a question, rely on your general knowledge but mention that you're not finding specific company information about that topic.
";

/// Appointment booking instructions
pub const APPOINTMENT_INSTRUCTIONS: &str = "
You have the ability to book appointments for users. When a user wants to schedule an appointment, book something, or set up a meeting:

1. Collect the following information naturally in conversation:
   - Caller's full name
   - Caller's contact number (phone number)
   - Appointment details (what they want to book, preferred date/time, purpose, etc.)

2. Once you have all the required information, use the book_appointment function to create the appointment.

3. After successfully booking, confirm the appointment details with the user.

4. If any required information is missing, politely ask for it before booking.
";

/// Keeps answers speakable
pub const VOICE_OUTPUT_INSTRUCTIONS: &str = "
Do not format your answer in any markdown or include \"asterisk\" or \"star\" or any symbols that should not be read or spoken.
When giving phone numbers, give the numbers to be read e.g. ZERO NINE ONE SEVEN, etc.
When giving time, give the time to be read e.g. TEN THIRTY, etc.
";

/// Build the full system prompt for a company
///
/// Blank or missing custom retrieval instructions fall back to
/// [`DEFAULT_RAG_INSTRUCTIONS`].
pub fn build_system_prompt(company_prompt: &str, rag_instructions: Option<&str>) -> String {
    let rag = rag_instructions
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(DEFAULT_RAG_INSTRUCTIONS);

    [
        company_prompt,
        rag,
        APPOINTMENT_INSTRUCTIONS,
        VOICE_OUTPUT_INSTRUCTIONS,
    ]
    .join("\n\n")
}
