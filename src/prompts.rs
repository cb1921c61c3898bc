//! Prompts for the vision fallback.
//!
//! Centralising the prompt text here keeps the vision client free of prompt
//! engineering and lets unit tests check the contract (the JSON keys the
//! parser expects) without calling a model.

/// Key holding the nine-character share code in the model's JSON answer.
pub const SHARE_CODE_KEY: &str = "share_code_raw9";

/// Key holding the free-form date of birth in the model's JSON answer.
pub const DOB_KEY: &str = "dob";

/// Instruction sent as the system message of every vision call.
pub const VISION_SYSTEM_PROMPT: &str = r#"You read UK Right to Work details from document images.

Answer with strict JSON only, exactly these keys:
{
  "share_code_raw9": "XXXXXXXXX",
  "dob": "DD/MM/YYYY"
}

Rules:
1. The share code is 9 characters from A-Z and 0-9. Drop spaces and dashes.
2. The date of birth must be a real calendar date. Expand a 2-digit year to a plausible 4-digit birth year (96 -> 1996).
3. When several candidates appear, pick the most likely one.
4. Use an empty string for a value you cannot find.
5. No Markdown fences, no commentary."#;

/// Text placed before the images of the share-code document.
pub const SHARE_CODE_GROUP_LABEL: &str = "SHARE CODE DOCUMENT IMAGES:";

/// Text placed before the images of the date-of-birth document.
pub const DOB_GROUP_LABEL: &str = "DOB DOCUMENT IMAGES:";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_names_both_keys() {
        assert!(VISION_SYSTEM_PROMPT.contains(SHARE_CODE_KEY));
        assert!(VISION_SYSTEM_PROMPT.contains(&format!("\"{DOB_KEY}\"")));
    }

    #[test]
    fn group_labels_are_distinct() {
        assert_ne!(SHARE_CODE_GROUP_LABEL, DOB_GROUP_LABEL);
    }
}
