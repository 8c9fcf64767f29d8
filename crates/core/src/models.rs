use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

pub const MIN_QUESTIONS: usize = 1;
pub const MAX_QUESTIONS: usize = 10;
pub const DEFAULT_QUESTIONS: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Choice {
    pub key: String,
    pub value: String,
}

impl Choice {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}) {}", self.key, self.value)
    }
}

/// A multiple-choice question as produced by the generator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Question {
    pub question: String,
    pub choices: Vec<Choice>,
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl Question {
    /// Checks the shape a quiz needs: a prompt, at least two uniquely
    /// labelled choices and an answer that names one of them.
    pub fn validate(&self) -> Result<(), String> {
        if self.question.trim().is_empty() {
            return Err("question prompt is empty".to_string());
        }

        if self.choices.len() < 2 {
            return Err(format!(
                "expected at least 2 choices, got {}",
                self.choices.len()
            ));
        }

        let mut seen = HashSet::new();
        for choice in &self.choices {
            let key = choice.key.trim();
            if key.is_empty() {
                return Err("choice has an empty key".to_string());
            }
            if !seen.insert(key.to_lowercase()) {
                return Err(format!("duplicate choice key {key:?}"));
            }
        }

        if self.correct_choice().is_none() {
            return Err(format!(
                "answer {:?} is not one of the choice keys",
                self.answer
            ));
        }

        Ok(())
    }

    pub fn correct_choice(&self) -> Option<&Choice> {
        let answer = self.answer.trim();
        self.choices
            .iter()
            .find(|choice| choice.key.trim().eq_ignore_ascii_case(answer))
    }

    /// Accepts either a bare label ("B") or a rendered choice ("B) text").
    pub fn is_correct(&self, response: &str) -> bool {
        let answer = self.answer.trim();
        match response_label(response) {
            Some(label) if !answer.is_empty() => label.eq_ignore_ascii_case(answer),
            _ => false,
        }
    }

    /// The choice a response names, matched the same way as `is_correct`.
    pub fn choice_for(&self, response: &str) -> Option<&Choice> {
        let label = response_label(response)?;
        self.choices
            .iter()
            .find(|choice| choice.key.trim().eq_ignore_ascii_case(label))
    }

    pub(crate) fn normalized_prompt(&self) -> String {
        self.question
            .split_whitespace()
            .map(|token| token.to_lowercase())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn response_label(response: &str) -> Option<&str> {
    let label = match response.trim().split_once(')') {
        Some((label, _)) => label.trim(),
        None => response.trim(),
    };
    (!label.is_empty()).then_some(label)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuizRequest {
    pub topic: String,
    pub num_questions: usize,
}

impl QuizRequest {
    pub fn new(topic: impl Into<String>, num_questions: usize) -> Self {
        Self {
            topic: topic.into(),
            num_questions,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.topic.trim().is_empty() {
            return Err("topic is empty".to_string());
        }

        if !(MIN_QUESTIONS..=MAX_QUESTIONS).contains(&self.num_questions) {
            return Err(format!(
                "number of questions must be between {MIN_QUESTIONS} and {MAX_QUESTIONS}, got {}",
                self.num_questions
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct UploadedDocument {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl UploadedDocument {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageText {
    pub document: String,
    pub number: u32,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedDocument {
    pub document_id: String,
    pub name: String,
    pub checksum: String,
    pub page_count: usize,
    pub ingested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextChunk {
    pub chunk_id: String,
    pub document: String,
    pub page: u32,
    pub chunk_index: u64,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchCandidate {
    pub chunk_id: String,
    pub document: String,
    pub page: u32,
    pub score: f64,
    pub text: String,
    pub source: String,
}

/// Ranked snippets for one topic query, best first. Never empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawRetrievedContext")]
pub struct RetrievedContext {
    topic: String,
    candidates: Vec<SearchCandidate>,
}

#[derive(Deserialize)]
struct RawRetrievedContext {
    topic: String,
    candidates: Vec<SearchCandidate>,
}

impl TryFrom<RawRetrievedContext> for RetrievedContext {
    type Error = String;

    fn try_from(raw: RawRetrievedContext) -> Result<Self, Self::Error> {
        Self::new(raw.topic, raw.candidates)
            .ok_or_else(|| "retrieved context needs at least one candidate".to_string())
    }
}

impl RetrievedContext {
    pub fn new(topic: impl Into<String>, candidates: Vec<SearchCandidate>) -> Option<Self> {
        if candidates.is_empty() {
            return None;
        }

        Some(Self {
            topic: topic.into(),
            candidates,
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn candidates(&self) -> &[SearchCandidate] {
        &self.candidates
    }

    pub fn best(&self) -> Option<&SearchCandidate> {
        self.candidates.first()
    }

    pub fn as_prompt_context(&self) -> String {
        self.candidates
            .iter()
            .map(|candidate| candidate.text.trim())
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}
