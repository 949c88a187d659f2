//! Structuring prompt for prescription text.
//!
//! The section labels and the `Medicine Name` field are load-bearing: the
//! reply parser in [`crate::extraction`] keys on them.

/// Section labels requested from the generative service, in reply order.
pub const SECTION_LABELS: [&str; 4] = [
    "Patient Information",
    "Doctor Information",
    "Medications",
    "Special Instructions",
];

/// Build the structuring prompt for one prescription's extracted text.
///
/// Sentinel texts (e.g. "Error extracting text") are passed through as-is;
/// the service still gets a best-effort attempt.
pub fn make_structuring_prompt(text: &str) -> String {
    format!(
        r#"Organize the following prescription text into a structured format with clearly labeled sections:
- *{patient}* (Name, Age, Gender if available)
- *{doctor}* (Name, Hospital/Clinic, License Number if available)
- *{medications}* (Medicine Name, Dosage, Frequency)
- *{instructions}* (Dietary advice, warnings, or extra instructions)
Prescription Text: {text}"#,
        patient = SECTION_LABELS[0],
        doctor = SECTION_LABELS[1],
        medications = SECTION_LABELS[2],
        instructions = SECTION_LABELS[3],
        text = text,
    )
}
