// Prompt fragments shared by every module that calls the LLM.

/// Builds the instruction telling the model which language to write prose in.
pub fn language_instruction(language: Option<&str>) -> String {
    match language.map(str::trim).filter(|l| !l.is_empty()) {
        Some(lang) => format!(
            "Write every explanation, problem and recommendation in the language with code '{lang}'. \
             Keep JSON keys in English."
        ),
        None => "Write every explanation, problem and recommendation in the same language \
                 as the job posting. Keep JSON keys in English."
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_instruction_uses_hint() {
        assert!(language_instruction(Some("ru")).contains("'ru'"));
    }

    #[test]
    fn test_language_instruction_blank_hint_falls_back() {
        assert!(language_instruction(Some("  ")).contains("same language"));
        assert!(language_instruction(None).contains("same language"));
    }
}
