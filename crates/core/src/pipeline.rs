use crate::collection::TopicCollection;
use crate::embeddings::Embedder;
use crate::extractor::{LopdfExtractor, PdfExtractor};
use crate::generator::{QuestionGenerator, QuizGenerator};
use crate::ingest::{DocumentProcessor, IngestionReport};
use crate::session::QuizSession;
use crate::traits::VectorIndex;
use crate::{PipelineError, QuizRequest, RetrievedContext, UploadedDocument};
use tracing::info;

/// Upload → collection → topic retrieval → generation → session.
pub struct QuizPipeline<E, V, G, X = LopdfExtractor> {
    processor: DocumentProcessor<X>,
    collection: TopicCollection<E, V>,
    generator: QuizGenerator<G>,
}

impl<E, V, G, X> QuizPipeline<E, V, G, X>
where
    E: Embedder + Send + Sync,
    V: VectorIndex + Send + Sync,
    G: QuestionGenerator + Send + Sync,
    X: PdfExtractor,
{
    pub fn new(
        processor: DocumentProcessor<X>,
        collection: TopicCollection<E, V>,
        generator: QuizGenerator<G>,
    ) -> Self {
        Self {
            processor,
            collection,
            generator,
        }
    }

    pub fn processor(&self) -> &DocumentProcessor<X> {
        &self.processor
    }

    /// Ingests the uploads and indexes every page seen so far.
    pub async fn load_documents(
        &mut self,
        uploads: &[UploadedDocument],
    ) -> Result<IngestionReport, PipelineError> {
        let report = self.processor.ingest_documents(uploads);
        if self.processor.pages().is_empty() {
            return Err(PipelineError::NoDocumentsProcessed {
                skipped: report
                    .skipped
                    .iter()
                    .map(|skipped| format!("{}: {}", skipped.name, skipped.reason))
                    .collect(),
            });
        }

        info!(
            pages = self.processor.pages().len(),
            skipped = report.skipped.len(),
            "documents processed"
        );

        self.collection
            .create_collection(self.processor.pages())
            .await?;
        Ok(report)
    }

    pub async fn retrieve(&self, topic: &str) -> Result<RetrievedContext, PipelineError> {
        self.collection
            .query_topic(topic)
            .await?
            .ok_or_else(|| PipelineError::NoRelevantContext {
                topic: topic.to_string(),
            })
    }

    pub async fn build_session(
        &mut self,
        uploads: &[UploadedDocument],
        request: &QuizRequest,
    ) -> Result<QuizSession, PipelineError> {
        request.validate().map_err(PipelineError::InvalidRequest)?;
        self.load_documents(uploads).await?;

        let context = self.retrieve(&request.topic).await?;
        let questions = self
            .generator
            .generate_quiz(request, &context.as_prompt_context())
            .await?;

        info!(
            topic = %request.topic,
            requested = request.num_questions,
            generated = questions.len(),
            "quiz generated"
        );
        Ok(QuizSession::new(request.topic.clone(), questions)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::CollectionOptions;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::error::{GenerationError, IngestError};
    use crate::models::{Choice, PageText, Question};
    use crate::stores::InMemoryVectorStore;
    use async_trait::async_trait;
    use std::path::Path;
    use tempfile::TempDir;

    struct PlainTextExtractor;

    impl PdfExtractor for PlainTextExtractor {
        fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError> {
            let text = std::fs::read_to_string(path)?;
            if text.is_empty() {
                return Err(IngestError::PdfParse("no text".to_string()));
            }
            Ok(vec![PageText {
                document: String::new(),
                number: 1,
                text,
            }])
        }
    }

    struct CountingGenerator {
        fail: bool,
    }

    #[async_trait]
    impl QuestionGenerator for CountingGenerator {
        async fn generate_question(
            &self,
            topic: &str,
            context: &str,
        ) -> Result<Question, GenerationError> {
            if self.fail {
                return Err(GenerationError::EmptyCompletion);
            }
            Ok(Question {
                question: format!("About {topic}: {} chars of context?", context.len()),
                choices: vec![Choice::new("A", "yes"), Choice::new("B", "no")],
                answer: "A".to_string(),
                explanation: None,
            })
        }
    }

    type TestPipeline = QuizPipeline<
        CharacterNgramEmbedder,
        InMemoryVectorStore,
        CountingGenerator,
        PlainTextExtractor,
    >;

    fn pipeline(scratch: &TempDir, fail: bool, options: CollectionOptions) -> TestPipeline {
        QuizPipeline::new(
            DocumentProcessor::new(PlainTextExtractor).with_scratch_dir(scratch.path()),
            TopicCollection::with_options(
                CharacterNgramEmbedder::default(),
                InMemoryVectorStore::new(),
                options,
            ),
            QuizGenerator::new(CountingGenerator { fail }),
        )
    }

    fn uploads() -> Vec<UploadedDocument> {
        vec![UploadedDocument::new(
            "volcano.pdf",
            b"Volcanoes form where magma reaches the surface of the crust.".to_vec(),
        )]
    }

    #[tokio::test]
    async fn builds_a_navigable_session() -> Result<(), Box<dyn std::error::Error>> {
        let scratch = tempfile::tempdir()?;
        let mut pipeline = pipeline(&scratch, false, CollectionOptions::default());

        let session = pipeline
            .build_session(&uploads(), &QuizRequest::new("volcanoes", 1))
            .await?;

        assert_eq!(session.navigator().total_questions(), 1);
        assert!(session.current_question().question.starts_with("About volcanoes"));
        Ok(())
    }

    #[tokio::test]
    async fn invalid_request_is_rejected_before_ingestion() -> Result<(), Box<dyn std::error::Error>>
    {
        let scratch = tempfile::tempdir()?;
        let mut pipeline = pipeline(&scratch, false, CollectionOptions::default());

        let result = pipeline
            .build_session(&uploads(), &QuizRequest::new("volcanoes", 0))
            .await;
        assert!(matches!(result, Err(PipelineError::InvalidRequest(_))));
        assert!(pipeline.processor().pages().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn unreadable_uploads_mean_no_documents() -> Result<(), Box<dyn std::error::Error>> {
        let scratch = tempfile::tempdir()?;
        let mut pipeline = pipeline(&scratch, false, CollectionOptions::default());

        let result = pipeline
            .build_session(
                &[UploadedDocument::new("empty.pdf", Vec::new())],
                &QuizRequest::new("volcanoes", 2),
            )
            .await;
        match result {
            Err(PipelineError::NoDocumentsProcessed { skipped }) => {
                assert_eq!(skipped.len(), 1);
                assert!(skipped[0].starts_with("empty.pdf"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn irrelevant_topic_means_no_context() -> Result<(), Box<dyn std::error::Error>> {
        let scratch = tempfile::tempdir()?;
        let options = CollectionOptions {
            min_relevance: Some(1.1),
            ..CollectionOptions::default()
        };
        let mut pipeline = pipeline(&scratch, false, options);

        let result = pipeline
            .build_session(&uploads(), &QuizRequest::new("volcanoes", 2))
            .await;
        assert!(matches!(
            result,
            Err(PipelineError::NoRelevantContext { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn generation_failure_is_named() -> Result<(), Box<dyn std::error::Error>> {
        let scratch = tempfile::tempdir()?;
        let mut pipeline = pipeline(&scratch, true, CollectionOptions::default());

        let result = pipeline
            .build_session(&uploads(), &QuizRequest::new("volcanoes", 2))
            .await;
        assert!(matches!(
            result,
            Err(PipelineError::GenerationFailed(GenerationError::NoQuestions { requested: 2 }))
        ));
        Ok(())
    }
}
