//! Prompt templates and source excerpt formatting.

/// Fields extracted from government-style certificates.
pub const CERTIFICATE_FIELDS: [&str; 8] = [
    "person_name",
    "father_name",
    "date_of_birth",
    "category_or_caste",
    "certificate_type",
    "issuing_authority",
    "issue_date",
    "document_number",
];

/// Retrieval query used when certificate analysis is requested without a question.
pub const DEFAULT_CERTIFICATE_QUERY: &str = "extract certificate fields";

/// Answer returned by the model when the document lacks the information.
pub const NOT_MENTIONED: &str = "Not mentioned in document";

const EXCERPT_CHARS: usize = 300;

/// Prompt for grounded question answering.
pub fn question_prompt(context: &[String], question: &str) -> String {
    format!(
        "You are a helpful document assistant. Use only the provided context to answer.\n\
         If the answer is not in the document, say \"{NOT_MENTIONED}\".\n\n\
         Context:\n{}\n\n\
         Question:\n{question}\n",
        context.join("\n\n")
    )
}

/// Prompt asking for a strict JSON object with one key per requested field.
pub fn fill_form_prompt(fields: &[String], context: &[String]) -> String {
    let fields_block = fields
        .iter()
        .map(|field| format!("- {field}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "You are a form-filling assistant. Extract the following fields and return STRICT JSON \
         with these keys:\n{fields_block}\n\n\
         Context:\n{}\n\n\
         If a field is missing or unreadable, use null.\n",
        context.join("\n\n")
    )
}

/// Prompt for structured certificate field extraction.
pub fn certificate_prompt(context: &[String]) -> String {
    let fields_block = CERTIFICATE_FIELDS
        .iter()
        .map(|field| format!("- {field}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "You are a document analyzer specialized in Indian government-style certificates.\n\n\
         INSTRUCTIONS:\n\
         - Extract the following fields and return STRICT JSON ONLY (no extra text).\n\
         - If a field is not present or not readable, set it to null.\n\
         - If the field is present but ambiguous, return the best guess and add a \"confidence\" \
         subfield if possible.\n\n\
         Fields to extract:\n{fields_block}\n\n\
         Context:\n{}\n",
        context.join("\n\n")
    )
}

/// Flatten a chunk into a single-line excerpt of at most 300 characters, cut on a word break.
pub fn excerpt(text: &str) -> String {
    let flat = text.replace('\n', " ");
    let flat = flat.trim();
    if flat.chars().count() <= EXCERPT_CHARS {
        return flat.to_string();
    }
    let cut: String = flat.chars().take(EXCERPT_CHARS).collect();
    let head = match cut.rsplit_once(' ') {
        Some((head, _)) => head,
        None => cut.as_str(),
    };
    format!("{head}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn question_prompt_embeds_context_and_question() {
        let prompt = question_prompt(&["alpha".into(), "beta".into()], "What is alpha?");
        assert!(prompt.contains("Context:\nalpha\n\nbeta"));
        assert!(prompt.contains("Question:\nWhat is alpha?"));
        assert!(prompt.contains(NOT_MENTIONED));
    }

    #[test]
    fn fill_form_prompt_lists_fields() {
        let prompt = fill_form_prompt(&["name".into(), "dob".into()], &["ctx".into()]);
        assert!(prompt.contains("- name\n- dob"));
        assert!(prompt.contains("use null"));
    }

    #[test]
    fn certificate_prompt_lists_every_field() {
        let prompt = certificate_prompt(&[]);
        for field in CERTIFICATE_FIELDS {
            assert!(prompt.contains(field), "missing {field}");
        }
    }

    #[test]
    fn short_excerpt_is_flattened_only() {
        assert_eq!(excerpt(" line one\nline two "), "line one line two");
    }

    #[test]
    fn long_excerpt_is_cut_on_word_boundary() {
        let text = "word ".repeat(100);
        let cut = excerpt(&text);
        assert!(cut.ends_with("word..."));
        assert!(cut.chars().count() <= 303);
    }
}
