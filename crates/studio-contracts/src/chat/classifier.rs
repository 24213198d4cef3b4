use serde::{Deserialize, Serialize};

use super::conversation::{last_image, ConversationTurn};

pub const EDIT_KEYWORDS: &[&str] = &["change", "modify", "edit", "make it", "add", "remove"];

pub const EDIT_PROMPT_PREFIX: &str = "Based on the previous image generation, now: ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    Generate,
    Edit,
}

impl GenerationMode {
    pub fn as_str(self) -> &'static str {
        match self {
            GenerationMode::Generate => "generate",
            GenerationMode::Edit => "edit",
        }
    }

    pub fn is_edit(self) -> bool {
        self == GenerationMode::Edit
    }
}

/// Decides whether a prompt asks to change an earlier image or to start over.
pub trait IntentClassifier: Send + Sync {
    fn classify(&self, prompt: &str, history: &[ConversationTurn]) -> GenerationMode;
}

/// Substring heuristic over a fixed keyword list.
///
/// Matches are plain and case-insensitive, so "add some context" counts as an
/// edit whenever there is history.
#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    keywords: Vec<String>,
}

impl KeywordClassifier {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|keyword| keyword.as_ref().to_lowercase())
                .filter(|keyword| !keyword.is_empty())
                .collect(),
        }
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::new(EDIT_KEYWORDS)
    }
}

impl IntentClassifier for KeywordClassifier {
    fn classify(&self, prompt: &str, history: &[ConversationTurn]) -> GenerationMode {
        if history.is_empty() {
            return GenerationMode::Generate;
        }
        let lowered = prompt.to_lowercase();
        if self
            .keywords
            .iter()
            .any(|keyword| lowered.contains(keyword.as_str()))
        {
            GenerationMode::Edit
        } else {
            GenerationMode::Generate
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub mode: GenerationMode,
    pub effective_prompt: String,
    /// True when the prompt was rewritten to point at an earlier image.
    pub anchored: bool,
}

pub fn classify_request(
    classifier: &dyn IntentClassifier,
    prompt: &str,
    history: &[ConversationTurn],
) -> Classification {
    let mode = classifier.classify(prompt, history);
    let effective = effective_prompt(mode, prompt, history);
    Classification {
        mode,
        anchored: effective != prompt,
        effective_prompt: effective,
    }
}

/// The prompt sent downstream. Edits are only rewritten when some earlier
/// assistant turn actually carries an image.
pub fn effective_prompt(mode: GenerationMode, prompt: &str, history: &[ConversationTurn]) -> String {
    if mode.is_edit() && last_image(history).is_some() {
        format!("{EDIT_PROMPT_PREFIX}{prompt}")
    } else {
        prompt.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image_history() -> Vec<ConversationTurn> {
        vec![
            ConversationTurn::user("a lighthouse"),
            ConversationTurn::assistant(
                "Image generated successfully!",
                Some("data:image/png;base64,AAAA".to_string()),
            ),
        ]
    }

    #[test]
    fn prompts_without_keywords_are_never_edits() {
        let classifier = KeywordClassifier::default();
        for prompt in ["a quiet harbor", "Sunset over DUNES", "two owls"] {
            assert_eq!(classifier.classify(prompt, &[]), GenerationMode::Generate);
            assert_eq!(
                classifier.classify(prompt, &image_history()),
                GenerationMode::Generate
            );
        }
    }

    #[test]
    fn empty_history_dominates_keywords() {
        let classifier = KeywordClassifier::default();
        for keyword in EDIT_KEYWORDS {
            let prompt = format!("please {keyword} the sky");
            assert_eq!(classifier.classify(&prompt, &[]), GenerationMode::Generate);
        }
    }

    #[test]
    fn keywords_match_case_insensitively() {
        let classifier = KeywordClassifier::default();
        let history = vec![ConversationTurn::user("hi")];
        assert_eq!(
            classifier.classify("REMOVE the boat", &history),
            GenerationMode::Edit
        );
        assert_eq!(
            classifier.classify("Make It brighter", &history),
            GenerationMode::Edit
        );
    }

    #[test]
    fn incidental_keyword_still_counts_as_edit() {
        let classifier = KeywordClassifier::default();
        assert_eq!(
            classifier.classify("add some context to a new forest scene", &image_history()),
            GenerationMode::Edit
        );
        // "address" contains "add"
        assert_eq!(
            classifier.classify("an address plate", &image_history()),
            GenerationMode::Edit
        );
    }

    #[test]
    fn edit_with_prior_image_rewrites_prompt() {
        let classification = classify_request(
            &KeywordClassifier::default(),
            "Make it more colorful",
            &image_history(),
        );
        assert_eq!(classification.mode, GenerationMode::Edit);
        assert!(classification.anchored);
        assert_eq!(
            classification.effective_prompt,
            "Based on the previous image generation, now: Make it more colorful"
        );
    }

    #[test]
    fn edit_without_prior_image_keeps_prompt() {
        let history = vec![
            ConversationTurn::user("a cat"),
            ConversationTurn::assistant("Error: quota", None),
        ];
        let classification =
            classify_request(&KeywordClassifier::default(), "change the cat", &history);
        assert_eq!(classification.mode, GenerationMode::Edit);
        assert!(!classification.anchored);
        assert_eq!(classification.effective_prompt, "change the cat");
    }

    #[test]
    fn fresh_generation_keeps_prompt() {
        let classification = classify_request(
            &KeywordClassifier::default(),
            "Create a futuristic city at sunset",
            &[],
        );
        assert_eq!(classification.mode, GenerationMode::Generate);
        assert_eq!(
            classification.effective_prompt,
            "Create a futuristic city at sunset"
        );
    }

    #[test]
    fn custom_classifier_can_replace_keywords() {
        struct AlwaysEdit;
        impl IntentClassifier for AlwaysEdit {
            fn classify(&self, _prompt: &str, _history: &[ConversationTurn]) -> GenerationMode {
                GenerationMode::Edit
            }
        }

        let classification = classify_request(&AlwaysEdit, "a dog", &image_history());
        assert_eq!(
            classification.effective_prompt,
            format!("{EDIT_PROMPT_PREFIX}a dog")
        );

        let narrow = KeywordClassifier::new(["tweak"]);
        assert_eq!(narrow.keywords(), ["tweak".to_string()]);
        assert_eq!(
            narrow.classify("change it", &image_history()),
            GenerationMode::Generate
        );
    }
}
