use async_trait::async_trait;
use chatbot_service::config::{
    BotServerConfig, ChatbotConfig, GeneratorConfig, GeneratorKind, NormalizerConfig,
};
use chatbot_service::services::providers::{GenerationError, TextGenerator};
use chatbot_service::startup::Application;
use service_core::config::Config as CoreConfig;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Scripted generator: echoes the query, then follows `reply`.
pub struct StubGenerator {
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Duration,
    behaviour: Behaviour,
}

pub enum Behaviour {
    /// `"<query>: <text>"`, like a causal model continuing its prompt.
    Echo(String),
    /// A fixed raw text.
    Raw(String),
    Fail,
    Panic,
}

impl StubGenerator {
    pub fn new(behaviour: Behaviour) -> Arc<Self> {
        Self::with_delay(behaviour, Duration::ZERO)
    }

    pub fn with_delay(behaviour: Behaviour, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            delay,
            behaviour,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of `generate` calls that were running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextGenerator for StubGenerator {
    async fn generate(&self, query: &str) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        match &self.behaviour {
            Behaviour::Echo(text) => Ok(format!("{}: {}", query, text)),
            Behaviour::Raw(text) => Ok(text.clone()),
            Behaviour::Fail => Err(GenerationError::ApiError("model unavailable".to_string())),
            Behaviour::Panic => panic!("generator crashed"),
        }
    }

    async fn health_check(&self) -> Result<(), GenerationError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}

pub struct TestApp {
    pub http_port: u16,
    pub bot_port: u16,
}

impl TestApp {
    pub async fn spawn(generator: Arc<dyn TextGenerator>) -> Self {
        Self::spawn_with_workers(generator, 10).await
    }

    pub async fn spawn_with_workers(generator: Arc<dyn TextGenerator>, workers: usize) -> Self {
        let app = Application::build(test_config(workers), generator)
            .await
            .expect("Failed to build test application");

        let http_port = app.http_port();
        let bot_port = app.bot_port();

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        wait_for_listener(bot_port).await;

        TestApp {
            http_port,
            bot_port,
        }
    }

    /// One full exchange: write `payload`, read until the server closes.
    pub async fn send_raw(&self, payload: &[u8]) -> Vec<u8> {
        let mut stream = TcpStream::connect(("127.0.0.1", self.bot_port))
            .await
            .expect("Failed to connect to bot");
        stream.write_all(payload).await.expect("Failed to send");

        let mut reply = Vec::new();
        tokio::time::timeout(Duration::from_secs(10), stream.read_to_end(&mut reply))
            .await
            .expect("Server did not close the connection")
            .expect("Failed to read reply");
        reply
    }

    pub async fn send(&self, payload: &[u8]) -> serde_json::Value {
        let reply = self.send_raw(payload).await;
        serde_json::from_slice(&reply).expect("Reply is not a single JSON object")
    }

    pub async fn ask(&self, query: &str) -> serde_json::Value {
        let body = serde_json::json!({ "Query": query }).to_string();
        self.send(body.as_bytes()).await
    }
}

/// Configuration on random ports (port 0) with the given pool size.
pub fn test_config(workers: usize) -> ChatbotConfig {
    ChatbotConfig {
        common: CoreConfig { port: 0 },
        bot: BotServerConfig {
            port: 0,
            worker_pool_size: workers,
            ..BotServerConfig::default()
        },
        generator: GeneratorConfig {
            provider: GeneratorKind::Mock,
            ..GeneratorConfig::default()
        },
        normalizer: NormalizerConfig::default(),
    }
}

/// Wait for the bot listener to accept connections.
pub async fn wait_for_listener(bot_port: u16) {
    for _ in 0..50 {
        if TcpStream::connect(("127.0.0.1", bot_port)).await.is_ok() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
