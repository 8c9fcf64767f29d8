use crate::error::GenerationError;
use crate::models::{Question, QuizRequest};
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::OnceLock;
use tracing::{debug, warn};

const SYSTEM_PROMPT: &str = "You write multiple-choice quiz questions for students. \
Use only facts found in the supplied context. \
Reply with a single JSON object and nothing else, shaped as: \
{\"question\": \"...\", \"choices\": [{\"key\": \"A\", \"value\": \"...\"}, {\"key\": \"B\", \"value\": \"...\"}, {\"key\": \"C\", \"value\": \"...\"}, {\"key\": \"D\", \"value\": \"...\"}], \
\"answer\": \"<key of the correct choice>\", \"explanation\": \"why the answer is correct\"}.";

#[async_trait]
pub trait QuestionGenerator {
    async fn generate_question(
        &self,
        topic: &str,
        context: &str,
    ) -> Result<Question, GenerationError>;
}

#[async_trait]
impl<T> QuestionGenerator for Box<T>
where
    T: QuestionGenerator + ?Sized + Send + Sync,
{
    async fn generate_question(
        &self,
        topic: &str,
        context: &str,
    ) -> Result<Question, GenerationError> {
        (**self).generate_question(topic, context).await
    }
}

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: f32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            temperature: 0.8,
        }
    }
}

/// Asks an OpenAI-compatible chat completion endpoint for one question.
pub struct ChatCompletionGenerator {
    config: GeneratorConfig,
    client: Client,
}

impl ChatCompletionGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    fn request_body(&self, topic: &str, context: &str) -> Value {
        json!({
            "model": self.config.model,
            "temperature": self.config.temperature,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                {
                    "role": "user",
                    "content": format!("Topic: {topic}\n\nContext:\n{context}\n\nWrite one new question about the topic."),
                }
            ],
        })
    }
}

#[async_trait]
impl QuestionGenerator for ChatCompletionGenerator {
    async fn generate_question(
        &self,
        topic: &str,
        context: &str,
    ) -> Result<Question, GenerationError> {
        let mut request = self
            .client
            .post(&self.config.endpoint)
            .json(&self.request_body(topic, context));
        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        GenerationError::ensure_success("chat-completion", response.status())?;

        let payload: Value = response.json().await?;
        parse_question(completion_content(&payload)?)
    }
}

/// First choice's message text; blank or missing content is an empty completion.
fn completion_content(payload: &Value) -> Result<&str, GenerationError> {
    payload
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .filter(|content| !content.trim().is_empty())
        .ok_or(GenerationError::EmptyCompletion)
}

fn code_fence() -> Result<&'static Regex, GenerationError> {
    static FENCE: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    FENCE
        .get_or_init(|| Regex::new(r"(?s)^\s*```[a-zA-Z]*\s*(.*?)\s*```\s*$"))
        .as_ref()
        .map_err(|error| GenerationError::RegexError(error.clone()))
}

/// Parses a model reply into a validated question. Markdown code fences
/// around the JSON are tolerated.
pub fn parse_question(content: &str) -> Result<Question, GenerationError> {
    let body = code_fence()?
        .captures(content)
        .and_then(|captures| captures.get(1))
        .map(|body| body.as_str())
        .unwrap_or(content);

    let question: Question = serde_json::from_str(body.trim())?;
    question
        .validate()
        .map_err(GenerationError::InvalidQuestion)?;
    Ok(question)
}

/// Builds a question bank one question at a time, dropping invalid and
/// repeated questions.
pub struct QuizGenerator<G> {
    generator: G,
}

impl<G> QuizGenerator<G>
where
    G: QuestionGenerator + Send + Sync,
{
    pub fn new(generator: G) -> Self {
        Self { generator }
    }

    pub async fn generate_quiz(
        &self,
        request: &QuizRequest,
        context: &str,
    ) -> Result<Vec<Question>, GenerationError> {
        let mut bank = Vec::with_capacity(request.num_questions);
        let mut seen = HashSet::new();

        for attempt in 0..request.num_questions {
            let question = match self
                .generator
                .generate_question(&request.topic, context)
                .await
            {
                Ok(question) => question,
                Err(
                    error @ (GenerationError::MalformedQuestion(_)
                    | GenerationError::InvalidQuestion(_)
                    | GenerationError::EmptyCompletion),
                ) => {
                    warn!(attempt, %error, "discarding invalid question");
                    continue;
                }
                Err(error) => return Err(error),
            };

            if !seen.insert(question.normalized_prompt()) {
                warn!(attempt, question = %question.question, "discarding duplicate question");
                continue;
            }

            debug!(attempt, "question accepted");
            bank.push(question);
        }

        if bank.is_empty() {
            return Err(GenerationError::NoQuestions {
                requested: request.num_questions,
            });
        }

        Ok(bank)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Choice;
    use std::sync::Mutex;

    struct ScriptedGenerator {
        replies: Mutex<Vec<Result<Question, GenerationError>>>,
    }

    impl ScriptedGenerator {
        fn new(mut replies: Vec<Result<Question, GenerationError>>) -> Self {
            replies.reverse();
            Self {
                replies: Mutex::new(replies),
            }
        }
    }

    #[async_trait]
    impl QuestionGenerator for ScriptedGenerator {
        async fn generate_question(
            &self,
            _topic: &str,
            _context: &str,
        ) -> Result<Question, GenerationError> {
            self.replies
                .lock()
                .expect("lock")
                .pop()
                .unwrap_or(Err(GenerationError::EmptyCompletion))
        }
    }

    fn question(prompt: &str) -> Question {
        Question {
            question: prompt.to_string(),
            choices: vec![Choice::new("A", "one"), Choice::new("B", "two")],
            answer: "A".to_string(),
            explanation: None,
        }
    }

    #[test]
    fn fenced_json_is_parsed() {
        let reply = "```json\n{\"question\": \"Q?\", \"choices\": [{\"key\": \"A\", \"value\": \"x\"}, {\"key\": \"B\", \"value\": \"y\"}], \"answer\": \"B\"}\n```";
        let parsed = parse_question(reply).expect("fenced reply should parse");
        assert_eq!(parsed.answer, "B");
        assert_eq!(parsed.choices.len(), 2);
    }

    #[test]
    fn fence_pattern_is_compiled_once() -> Result<(), GenerationError> {
        let first = code_fence()?;
        let second = code_fence()?;
        assert!(std::ptr::eq(first, second));
        Ok(())
    }

    #[test]
    fn completion_content_reads_first_choice() -> Result<(), GenerationError> {
        let payload = json!({
            "choices": [{ "message": { "role": "assistant", "content": "{\"question\": \"Q?\"}" } }]
        });
        assert_eq!(completion_content(&payload)?, "{\"question\": \"Q?\"}");
        Ok(())
    }

    #[test]
    fn missing_or_blank_content_is_an_empty_completion() {
        for payload in [
            json!({ "choices": [] }),
            json!({ "choices": [{ "message": { "content": "   " } }] }),
            json!({ "choices": [{ "message": { "content": null } }] }),
            json!({ "error": { "message": "rate limited" } }),
        ] {
            assert!(matches!(
                completion_content(&payload),
                Err(GenerationError::EmptyCompletion)
            ));
        }
    }

    #[test]
    fn answer_outside_choices_is_rejected() {
        let reply = r#"{"question": "Q?", "choices": [{"key": "A", "value": "x"}, {"key": "B", "value": "y"}], "answer": "E"}"#;
        assert!(matches!(
            parse_question(reply),
            Err(GenerationError::InvalidQuestion(_))
        ));
    }

    #[test]
    fn untyped_reply_is_malformed() {
        assert!(matches!(
            parse_question(r#"{"question": "Q?", "choices": "A, B", "answer": "A"}"#),
            Err(GenerationError::MalformedQuestion(_))
        ));
    }

    #[tokio::test]
    async fn duplicates_and_invalid_replies_are_skipped() -> Result<(), GenerationError> {
        let generator = QuizGenerator::new(ScriptedGenerator::new(vec![
            Ok(question("What is one?")),
            Ok(question("what  is ONE?")),
            Err(GenerationError::InvalidQuestion("bad".to_string())),
            Ok(question("What is two?")),
        ]));

        let bank = generator
            .generate_quiz(&QuizRequest::new("numbers", 4), "context")
            .await?;
        let prompts = bank.iter().map(|q| q.question.as_str()).collect::<Vec<_>>();
        assert_eq!(prompts, vec!["What is one?", "What is two?"]);
        Ok(())
    }

    #[tokio::test]
    async fn transport_errors_propagate() {
        let generator = QuizGenerator::new(ScriptedGenerator::new(vec![Err(
            GenerationError::BackendResponse {
                backend: "chat-completion".to_string(),
                details: "503".to_string(),
            },
        )]));

        let result = generator
            .generate_quiz(&QuizRequest::new("numbers", 2), "context")
            .await;
        assert!(matches!(result, Err(GenerationError::BackendResponse { .. })));
    }

    #[tokio::test]
    async fn nothing_usable_is_an_error() {
        let generator = QuizGenerator::new(ScriptedGenerator::new(Vec::new()));
        let result = generator
            .generate_quiz(&QuizRequest::new("numbers", 3), "context")
            .await;
        assert!(matches!(
            result,
            Err(GenerationError::NoQuestions { requested: 3 })
        ));
    }

    #[test]
    fn request_body_carries_model_topic_and_context() {
        let generator = ChatCompletionGenerator::new(GeneratorConfig::default());
        let body = generator.request_body("cells", "Mitochondria make ATP.");
        assert_eq!(body["model"], "gpt-4o-mini");
        let user = body["messages"][1]["content"].as_str().unwrap_or_default();
        assert!(user.contains("Topic: cells"));
        assert!(user.contains("Mitochondria make ATP."));
    }
}
