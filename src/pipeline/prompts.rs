use crate::backends::Prompt;
use crate::utils::language::detect_language;

const ANSWER_RULES: &str = "answer questions about the insurance policy document provided below.

Rules:
1. Answer strictly from the policy text. Do not use outside knowledge or assumptions.
2. Cite the section, clause or page reference (for example \"[Page 4]\" or \"Clause 3.1.2\") that supports each statement.
3. Quote the exact policy wording when possible, using quotation marks.
4. Include every relevant number: periods, limits, percentages, amounts.
5. If the policy text does not contain the information, say so explicitly instead of guessing.
6. Keep the answer concise: at most a few short paragraphs.
7. Reply in the same language as the question.";

const SAFETY_POLICY: &str = "Content policy:
- Provide factual information about the policy only. Do not give medical, legal or financial advice beyond what the document states.
- Do not produce harmful, hateful, harassing or sexually explicit content.
- Do not reveal personal data other than what appears in the question.
- If the question asks for anything outside the policy document, decline briefly.";

/// System + user prompt for the primary chat backend.
pub fn primary_prompt(question: &str, policy_text: &str) -> Prompt {
    let language = detect_language(question);
    let system = format!("{}{}", language.role_prefix(), ANSWER_RULES);
    let user = format!(
        "POLICY DOCUMENT:\n{}\n\nQUESTION: {}\n\nANSWER:",
        policy_text, question
    );
    Prompt {
        system: Some(system),
        user,
    }
}

/// Single prompt for the fallback backend, with the content policy spelled out.
pub fn fallback_prompt(question: &str, policy_text: &str) -> Prompt {
    let language = detect_language(question);
    let user = format!(
        "{}{}\n\n{}\n\nPOLICY DOCUMENT:\n{}\n\nQUESTION: {}\n\nANSWER:",
        language.role_prefix(),
        ANSWER_RULES,
        SAFETY_POLICY,
        policy_text,
        question
    );
    Prompt { system: None, user }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_prompt_splits_rules_and_document() {
        let prompt = primary_prompt("What is the grace period?", "[Page 1]\nGrace period is 30 days");
        let system = prompt.system.expect("system prompt");
        assert!(system.starts_with("As an insurance policy analysis assistant, answer"));
        assert!(system.contains("explicitly"));
        assert!(!system.contains("Grace period is 30 days"));
        assert!(prompt.user.contains("[Page 1]\nGrace period is 30 days"));
        assert!(prompt.user.contains("QUESTION: What is the grace period?"));
    }

    #[test]
    fn prefix_follows_question_language() {
        let prompt = primary_prompt("宽限期是多久？", "text");
        assert!(prompt.system.unwrap().starts_with("作为保险条款分析助手，"));

        let prompt = fallback_prompt("ما هي فترة السماح؟", "text");
        assert!(prompt.user.starts_with("كمساعد لتحليل وثائق التأمين، "));
    }

    #[test]
    fn fallback_prompt_is_single_with_safety_block() {
        let prompt = fallback_prompt("Is maternity covered?", "[Page 2]\nMaternity: 24 months");
        assert!(prompt.system.is_none());
        assert!(prompt.user.contains("Content policy:"));
        assert!(prompt.user.contains("[Page 2]\nMaternity: 24 months"));
        assert!(prompt.user.ends_with("QUESTION: Is maternity covered?\n\nANSWER:"));
    }
}
