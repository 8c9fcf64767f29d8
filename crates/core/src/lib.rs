pub mod chunking;
pub mod collection;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod generator;
pub mod ingest;
pub mod models;
pub mod navigator;
pub mod pipeline;
pub mod session;
pub mod stores;
pub mod traits;

pub use chunking::{build_chunks, chunk_by_paragraph, normalize_whitespace, ChunkingConfig};
pub use collection::{CollectionOptions, TopicCollection};
pub use embeddings::{
    CharacterNgramEmbedder, Embedder, EmbeddingConfig, VertexEmbeddingClient,
    DEFAULT_EMBEDDING_BATCH_SIZE, DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{GenerationError, IngestError, PipelineError, QuizError, SearchError};
pub use extractor::{LopdfExtractor, PdfExtractor};
pub use generator::{
    parse_question, ChatCompletionGenerator, GeneratorConfig, QuestionGenerator, QuizGenerator,
};
pub use ingest::{
    discover_pdf_files, load_folder_uploads, DocumentProcessor, IngestionReport, SkippedDocument,
};
pub use models::{
    Choice, PageText, ProcessedDocument, Question, QuizRequest, RetrievedContext,
    SearchCandidate, TextChunk, UploadedDocument, DEFAULT_QUESTIONS, MAX_QUESTIONS,
    MIN_QUESTIONS,
};
pub use navigator::QuestionBankNavigator;
pub use pipeline::QuizPipeline;
pub use session::{AnswerOutcome, QuizSession};
pub use stores::{ChromaStore, InMemoryVectorStore};
pub use traits::VectorIndex;
