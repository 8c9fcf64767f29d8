use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use quizzify_core::{
    load_folder_uploads, AnswerOutcome, CharacterNgramEmbedder, ChatCompletionGenerator,
    ChromaStore, CollectionOptions, DocumentProcessor, Embedder, EmbeddingConfig,
    GeneratorConfig, InMemoryVectorStore, Question, QuizGenerator, QuizPipeline, QuizRequest, QuizSession,
    TopicCollection, UploadedDocument, VectorIndex, VertexEmbeddingClient,
    DEFAULT_EMBEDDING_BATCH_SIZE, DEFAULT_QUESTIONS,
};
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

type DynEmbedder = Box<dyn Embedder + Send + Sync>;
type DynIndex = Box<dyn VectorIndex + Send + Sync>;
type Pipeline = QuizPipeline<DynEmbedder, DynIndex, ChatCompletionGenerator>;

#[derive(Parser)]
#[command(name = "quizzify", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Embedding backend
    #[arg(long, value_enum, default_value_t = EmbedderKind::Local, env = "QUIZZIFY_EMBEDDER")]
    embedder: EmbedderKind,

    /// Vector store backend
    #[arg(long, value_enum, default_value_t = StoreKind::Memory, env = "QUIZZIFY_STORE")]
    store: StoreKind,

    /// Chroma base URL
    #[arg(long, default_value = "http://localhost:8000", env = "QUIZZIFY_CHROMA_URL")]
    chroma_url: String,

    /// Chroma collection name
    #[arg(long, default_value = "quiz_pages", env = "QUIZZIFY_CHROMA_COLLECTION")]
    chroma_collection: String,

    /// Google Cloud project hosting the embedding model
    #[arg(long, default_value = "", env = "QUIZZIFY_VERTEX_PROJECT")]
    vertex_project: String,

    /// Vertex AI region
    #[arg(long, default_value = "us-central1", env = "QUIZZIFY_VERTEX_LOCATION")]
    vertex_location: String,

    /// Vertex AI embedding model
    #[arg(long, default_value = "textembedding-gecko@003", env = "QUIZZIFY_VERTEX_MODEL")]
    vertex_model: String,

    /// Texts sent per Vertex AI predict call
    #[arg(long, default_value_t = DEFAULT_EMBEDDING_BATCH_SIZE, env = "QUIZZIFY_VERTEX_BATCH_SIZE")]
    vertex_batch_size: usize,

    /// OAuth access token for Vertex AI
    #[arg(long, env = "VERTEX_ACCESS_TOKEN", hide_env_values = true)]
    vertex_access_token: Option<String>,

    /// Chat completion endpoint used to write questions
    #[arg(
        long,
        default_value = "https://api.openai.com/v1/chat/completions",
        env = "QUIZZIFY_LLM_ENDPOINT"
    )]
    llm_endpoint: String,

    /// Chat completion model
    #[arg(long, default_value = "gpt-4o-mini", env = "QUIZZIFY_LLM_MODEL")]
    llm_model: String,

    /// API key for the chat completion endpoint
    #[arg(long, env = "LLM_API_KEY", hide_env_values = true)]
    llm_api_key: Option<String>,

    /// Number of snippets retrieved per topic
    #[arg(long, default_value = "4", env = "QUIZZIFY_TOP_K")]
    top_k: usize,
}

#[derive(Clone, Copy, ValueEnum)]
enum EmbedderKind {
    Local,
    Vertex,
}

#[derive(Clone, Copy, ValueEnum)]
enum StoreKind {
    Memory,
    Chroma,
}

#[derive(Subcommand)]
enum Command {
    /// Extract page text from every PDF in a folder.
    Ingest {
        /// Folder that contains PDFs recursively.
        #[arg(long)]
        folder: String,
    },
    /// Index a folder of PDFs and show the best matching passage for a topic.
    Query {
        #[arg(long)]
        folder: String,
        /// Topic to look up.
        #[arg(long)]
        topic: String,
    },
    /// Generate a quiz on a topic and take it interactively.
    Quiz {
        #[arg(long)]
        folder: String,
        /// Topic for the generated questions.
        #[arg(long)]
        topic: String,
        /// Number of questions (1-10).
        #[arg(long, default_value_t = DEFAULT_QUESTIONS)]
        num_questions: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "quizzify boot"
    );

    match &cli.command {
        Command::Ingest { folder } => {
            let mut processor: DocumentProcessor = DocumentProcessor::default();
            let report = processor.ingest_folder(Path::new(folder))?;

            for skipped in &report.skipped {
                warn!(name = %skipped.name, reason = %skipped.reason, "skipped pdf");
            }
            for document in processor.documents() {
                println!(
                    "{} pages={} checksum={}",
                    document.name, document.page_count, document.checksum
                );
            }
            println!("Total pages processed: {}", processor.pages().len());
        }
        Command::Query { folder, topic } => {
            let uploads = read_uploads(folder)?;
            let mut pipeline = build_pipeline(&cli)?;
            pipeline.load_documents(&uploads).await?;

            let context = pipeline.retrieve(topic).await?;
            let best = context
                .best()
                .ok_or_else(|| anyhow::anyhow!("no context returned for topic {topic:?}"))?;
            println!("Top document for topic {topic:?}:");
            println!(
                "[{}] {} page {} score={:.4}",
                best.source, best.document, best.page, best.score
            );
            println!("{}", best.text);
        }
        Command::Quiz {
            folder,
            topic,
            num_questions,
        } => {
            let uploads = read_uploads(folder)?;
            let mut pipeline = build_pipeline(&cli)?;
            let request = QuizRequest::new(topic.clone(), *num_questions);
            let session = pipeline.build_session(&uploads, &request).await?;
            run_quiz(session).await?;
        }
    }

    Ok(())
}

fn read_uploads(folder: &str) -> anyhow::Result<Vec<UploadedDocument>> {
    load_folder_uploads(Path::new(folder)).with_context(|| format!("reading pdfs from {folder}"))
}

fn build_pipeline(cli: &Cli) -> anyhow::Result<Pipeline> {
    let embedder: DynEmbedder = match cli.embedder {
        EmbedderKind::Local => Box::new(CharacterNgramEmbedder::default()),
        EmbedderKind::Vertex => Box::new(VertexEmbeddingClient::new(EmbeddingConfig {
            model_name: cli.vertex_model.clone(),
            project: cli.vertex_project.clone(),
            location: cli.vertex_location.clone(),
            access_token: cli.vertex_access_token.clone(),
            batch_size: cli.vertex_batch_size,
            ..EmbeddingConfig::default()
        })?),
    };

    let index: DynIndex = match cli.store {
        StoreKind::Memory => Box::new(InMemoryVectorStore::new()),
        StoreKind::Chroma => Box::new(ChromaStore::new(
            &cli.chroma_url,
            cli.chroma_collection.clone(),
            embedder.dimensions(),
        )?),
    };

    let collection = TopicCollection::with_options(
        embedder,
        index,
        CollectionOptions {
            top_k: cli.top_k.max(1),
            ..CollectionOptions::default()
        },
    );

    let generator = ChatCompletionGenerator::new(GeneratorConfig {
        endpoint: cli.llm_endpoint.clone(),
        model: cli.llm_model.clone(),
        api_key: cli.llm_api_key.clone(),
        ..GeneratorConfig::default()
    });

    Ok(QuizPipeline::new(
        DocumentProcessor::default(),
        collection,
        QuizGenerator::new(generator),
    ))
}

async fn run_quiz(mut session: QuizSession) -> anyhow::Result<()> {
    let total = session.navigator().total_questions();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("Generated quiz on {:?}: {total} question(s)", session.topic());
    println!("Answer with a choice key; n/p to move, +k/-k to jump, q to quit.");
    println!("A choice key always counts as an answer, so use quit when a choice is labelled Q.");

    loop {
        let question = session.current_question();
        println!();
        println!("Question {}/{}: {}", session.cursor() + 1, total, question.question);
        for choice in &question.choices {
            println!("  {choice}");
        }
        if let Some(previous) = session.answer_for(session.cursor()) {
            let label = if previous.is_correct() { "correct" } else { "incorrect" };
            println!("  (previously answered: {label})");
        }

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match classify_input(&line, session.current_question()) {
            QuizInput::Quit => break,
            QuizInput::Step(step) => {
                session.advance(step);
            }
            QuizInput::Unrecognised(input) => {
                println!("Unrecognised input {input:?}");
            }
            QuizInput::Answer(response) => {
                let explanation = session.current_question().explanation.clone();
                match session.submit_answer(&response) {
                    AnswerOutcome::Correct => println!("Correct!"),
                    AnswerOutcome::Incorrect { expected } => {
                        println!("Incorrect! The answer is {expected}")
                    }
                }
                if let Some(explanation) = explanation {
                    println!("{explanation}");
                }

                if session.is_complete() {
                    break;
                }
                session.advance(1);
            }
        }
    }

    let (correct, answered) = session.score();
    println!();
    println!("Score: {correct}/{answered} answered correctly ({total} questions)");
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum QuizInput {
    Answer(String),
    Step(i64),
    Quit,
    Unrecognised(String),
}

/// Choice keys win over navigation commands, so a question with a choice
/// labelled "N" still takes "n" as an answer.
fn classify_input(line: &str, question: &Question) -> QuizInput {
    let input = line.trim();
    if question.choice_for(input).is_some() {
        return QuizInput::Answer(input.to_string());
    }

    match input {
        "q" | "quit" => QuizInput::Quit,
        "n" | "" => QuizInput::Step(1),
        "p" => QuizInput::Step(-1),
        jump if jump.starts_with('+') || jump.starts_with('-') => match jump.parse::<i64>() {
            Ok(step) => QuizInput::Step(step),
            Err(_) => QuizInput::Unrecognised(jump.to_string()),
        },
        response => QuizInput::Answer(response.to_string()),
    }
}
