use serde::{Deserialize, Serialize};

pub const DEFAULT_NEEDLE: &str = "\n\nJamari: Pongo's logo is purple and white.\n\n";
pub const DEFAULT_QUESTION: &str = "What colors are in Pongo's logo?";
pub const DEFAULT_KEYWORDS: [&str; 2] = ["purple", "white"];

const INSTRUCTIONS: &str = "Based on the following context, give a brief answer to the provided question.  \
If the question cannot be answered by the context, say 'The question cannot be answered with the current context'.";
const CONTEXT_START: &str = "==========CONTEXT START==========";
const CONTEXT_END: &str = "==========CONTEXT END==========";

/// Where the question goes relative to the context block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptLayout {
    #[default]
    QuestionFirst,
    /// Question after the context, followed by an `Answer:` cue.
    QuestionLast,
}

impl std::str::FromStr for PromptLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "question_first" => Ok(Self::QuestionFirst),
            "question_last" => Ok(Self::QuestionLast),
            _ => Err(format!("invalid prompt layout: {s}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PromptTemplate {
    pub question: String,
    pub layout: PromptLayout,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            question: DEFAULT_QUESTION.into(),
            layout: PromptLayout::default(),
        }
    }
}

impl PromptTemplate {
    pub fn new(question: impl Into<String>, layout: PromptLayout) -> Self {
        Self {
            question: question.into(),
            layout,
        }
    }

    pub fn render(&self, context: &str) -> String {
        let question = &self.question;
        match self.layout {
            PromptLayout::QuestionFirst => format!(
                "{INSTRUCTIONS}\n\n Question: {question}\n\n {CONTEXT_START}\n{context}\n{CONTEXT_END}"
            ),
            PromptLayout::QuestionLast => format!(
                "{INSTRUCTIONS}\n\n {CONTEXT_START}\n{context}\n{CONTEXT_END}\n\nQuestion: {question}\n\nAnswer:"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_question_first() {
        let p = PromptTemplate::default().render("CTX");
        let q = p.find("Question:").unwrap();
        let c = p.find("CTX").unwrap();
        assert!(q < c);
        assert!(p.ends_with(CONTEXT_END));
    }

    #[test]
    fn test_question_last() {
        let p = PromptTemplate::new("Who?", PromptLayout::QuestionLast).render("CTX");
        assert!(p.find("CTX").unwrap() < p.find("Question: Who?").unwrap());
        assert!(p.ends_with("Answer:"));
    }

    #[test]
    fn test_layout_parse() {
        assert_eq!("question-last".parse::<PromptLayout>(), Ok(PromptLayout::QuestionLast));
        assert!("sideways".parse::<PromptLayout>().is_err());
    }
}
