//! Prompts for the vision OCR backend and the grading model.
//!
//! Callers can override the system prompts through
//! [`crate::backends::LlmOcrConfig::system_prompt`] and
//! [`crate::feedback::FeedbackConfig::system_prompt`]; the constants here are
//! used only when no override is provided.

/// System prompt for transcribing one answer-sheet page with a vision LLM.
///
/// The output feeds the structurer, which relies on the literal markers
/// `Q.`, `Question`, `UNIT TEST` and `PART-<letter>` surviving transcription.
pub const OCR_SYSTEM_PROMPT: &str = r#"You are an OCR engine. Transcribe ALL text visible in the scanned answer-sheet page image, handwritten and printed.

Rules:
- Output ONLY the transcribed text. No commentary, no Markdown, no code fences.
- Keep the reading order a teacher would follow.
- Copy question labels exactly as written, e.g. "Q.", "Question", "UNIT TEST", "PART-A".
- Do not correct the student's spelling, grammar or answers.
- If the page has no text, output nothing."#;

/// System prompt for the grading model.
pub const GRADER_SYSTEM_PROMPT: &str = "You are an experienced teacher grading student answer sheets. \
Be fair, specific and encouraging. Always state the grade on its own line in the form \"Grade: N/10\".";

/// Prompt asking for feedback on a student's submission alone.
pub fn feedback_prompt(submission: &str) -> String {
    format!(
        "Analyze the following student submission and provide:\n\
         1. Grade out of 10\n\
         2. Strengths\n\
         3. Areas for improvement\n\
         4. Personalized feedback to help the student improve.\n\n\
         Student Submission:\n{}",
        submission
    )
}

/// Prompt asking for feedback on a submission against a question paper or
/// model answer.
pub fn comparison_prompt(reference: &str, answer: &str) -> String {
    format!(
        "Compare the student's answer to the reference material and provide:\n\
         1. Grade out of 10 based on accuracy, completeness, and relevance.\n\
         2. Strengths in the student's answer.\n\
         3. Areas where the student can improve.\n\
         4. Personalized feedback explaining how the student can improve in future assignments.\n\n\
         === Question Paper / Model Answer ===\n{}\n\n\
         === Student's Answer ===\n{}",
        reference, answer
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ocr_prompt_names_every_marker() {
        for marker in ["Q.", "Question", "UNIT TEST", "PART-A"] {
            assert!(OCR_SYSTEM_PROMPT.contains(marker), "missing {marker}");
        }
    }

    #[test]
    fn grader_prompt_fixes_grade_format() {
        assert!(GRADER_SYSTEM_PROMPT.contains("Grade: N/10"));
    }

    #[test]
    fn feedback_prompt_embeds_submission() {
        let p = feedback_prompt("Page 1:\n\n\n=== Q. ===\nanswer\n\n");
        assert!(p.contains("Grade out of 10"));
        assert!(p.ends_with("=== Q. ===\nanswer\n\n"));
    }

    #[test]
    fn comparison_prompt_orders_reference_first() {
        let p = comparison_prompt("REFERENCE", "ANSWER");
        let r = p.find("REFERENCE").unwrap();
        let a = p.find("ANSWER").unwrap();
        assert!(r < a);
        assert!(p.contains("=== Student's Answer ==="));
    }
}
