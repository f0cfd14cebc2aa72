//! Message keeper client
//!
//! Resolves the message service through the registry, then feeds it the lines
//! of a text file: each line is saved, and a random substring of it is used
//! to search the stored messages back.

use crate::pb::message_keeper_service_client::MessageKeeperServiceClient;
use crate::pb::{FindMessagesRequest, SaveMessageRequest};
use crate::registry::RegistryClient;
use crate::MESSAGE_KEEPER_NAME;
use rand::Rng;
use std::future::Future;
use std::path::Path;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tonic::transport::Channel;
use tonic::Status;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),
    #[error("remote call failed: {0}")]
    Remote(#[from] Status),
    #[error("invalid endpoint {0}")]
    InvalidEndpoint(String),
    #[error("could not read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Client configuration
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub registry_host: String,
    pub registry_port: u16,
    /// Name the message service is bound under
    pub name: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            registry_host: "localhost".to_string(),
            registry_port: 1099,
            name: MESSAGE_KEEPER_NAME.to_string(),
        }
    }
}

impl ClientConfig {
    pub fn registry_addr(&self) -> String {
        format!("http://{}:{}", self.registry_host, self.registry_port)
    }
}

/// The remote message interface
pub trait MessageKeeper {
    fn save_message(&self, message: &str) -> impl Future<Output = Result<i64, ClientError>>;

    fn find_messages(
        &self,
        substring: &str,
    ) -> impl Future<Output = Result<Vec<String>, ClientError>>;
}

/// gRPC proxy for a message service located through the registry
#[derive(Clone)]
pub struct RemoteMessageKeeper {
    inner: MessageKeeperServiceClient<Channel>,
}

impl RemoteMessageKeeper {
    /// Connect directly to a message service endpoint
    pub async fn connect(endpoint: &str) -> Result<Self, ClientError> {
        tracing::info!("Connecting to message service at {}", endpoint);
        let channel = Channel::from_shared(endpoint.to_string())
            .map_err(|e| ClientError::InvalidEndpoint(format!("{}: {}", endpoint, e)))?
            .connect()
            .await?;
        Ok(Self {
            inner: MessageKeeperServiceClient::new(channel),
        })
    }

    /// Look up `config.name` in the registry and connect to what it names
    pub async fn locate(config: &ClientConfig) -> Result<Self, ClientError> {
        tracing::info!(
            "Binding to registry: {}:{}",
            config.registry_host,
            config.registry_port
        );
        let mut registry = RegistryClient::connect(&config.registry_addr()).await?;
        let endpoint = registry.lookup(&config.name).await?;
        Self::connect(&endpoint).await
    }
}

impl MessageKeeper for RemoteMessageKeeper {
    async fn save_message(&self, message: &str) -> Result<i64, ClientError> {
        let response = self
            .inner
            .clone()
            .save_message(SaveMessageRequest {
                message: message.to_string(),
            })
            .await?
            .into_inner();
        Ok(response.id)
    }

    async fn find_messages(&self, substring: &str) -> Result<Vec<String>, ClientError> {
        let response = self
            .inner
            .clone()
            .find_messages(FindMessagesRequest {
                substring: substring.to_string(),
            })
            .await?
            .into_inner();
        Ok(response.messages)
    }
}

/// Outcome of feeding a file to the message service
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FeedSummary {
    /// Lines sent
    pub lines: usize,
    /// Id returned by the first save
    pub first_id: Option<i64>,
    /// Id returned by the last save
    pub last_id: Option<i64>,
    /// Messages returned across all finds
    pub total_matches: usize,
    /// Finds that returned nothing
    pub empty_finds: usize,
}

impl FeedSummary {
    fn record(&mut self, id: i64, matches: usize) {
        self.lines += 1;
        self.first_id.get_or_insert(id);
        self.last_id = Some(id);
        self.total_matches += matches;
        if matches == 0 {
            self.empty_finds += 1;
        }
    }
}

/// Strip a trailing `\n` or `\r\n` and decode, replacing malformed UTF-8
fn decode_line(buf: &[u8]) -> String {
    let line = buf.strip_suffix(b"\n").unwrap_or(buf);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}

/// Pick a random non-empty substring of `line`, on character boundaries.
///
/// Returns an empty string only for an empty line.
pub fn random_substring<'a, R: Rng + ?Sized>(line: &'a str, rng: &mut R) -> &'a str {
    let boundaries: Vec<usize> = line
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(line.len()))
        .collect();
    let len = boundaries.len() - 1;
    if len == 0 {
        return "";
    }

    let start = rng.gen_range(0..len);
    let end = start + 1 + rng.gen_range(0..len - start);
    &line[boundaries[start]..boundaries[end]]
}

/// Sends file lines to a [`MessageKeeper`], one save and one find per line
pub struct MessageFeeder<K, R> {
    keeper: K,
    rng: R,
}

impl<K: MessageKeeper, R: Rng> MessageFeeder<K, R> {
    pub fn new(keeper: K, rng: R) -> Self {
        Self { keeper, rng }
    }

    /// Send every line of the file at `path`.
    ///
    /// Reading stops at end of file or at the first empty line. Bytes that
    /// are not valid UTF-8 are replaced with U+FFFD.
    pub async fn process_file_lines(
        &mut self,
        path: impl AsRef<Path>,
    ) -> Result<FeedSummary, ClientError> {
        let path = path.as_ref();
        let io_err = |source| ClientError::Io {
            path: path.display().to_string(),
            source,
        };

        tracing::info!("Processing file: {}", path.display());

        let file = File::open(path).await.map_err(io_err)?;
        let mut reader = BufReader::new(file);
        let mut buf = Vec::new();
        let mut summary = FeedSummary::default();

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await.map_err(io_err)? == 0 {
                break;
            }
            let line = decode_line(&buf);
            if line.is_empty() {
                break;
            }
            let (id, matches) = self.process_line(&line).await?;
            summary.record(id, matches);
        }

        Ok(summary)
    }

    /// Save `line`, then search by a random substring of it.
    ///
    /// Returns the saved id and the number of messages found.
    pub async fn process_line(&mut self, line: &str) -> Result<(i64, usize), ClientError> {
        tracing::info!("Sending message: {}", line);
        let id = self.keeper.save_message(line).await?;

        let substring = random_substring(line, &mut self.rng);
        tracing::info!("Finding messages: {}", substring);
        let messages = self.keeper.find_messages(substring).await?;
        tracing::info!(
            "Got {} messages for substring: {}",
            messages.len(),
            substring
        );

        Ok((id, messages.len()))
    }

    pub fn into_keeper(self) -> K {
        self.keeper
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::cell::RefCell;
    use std::io::Write;

    /// Records calls and answers with substring matches over saved lines
    #[derive(Default)]
    struct RecordingKeeper {
        saved: RefCell<Vec<String>>,
        finds: RefCell<Vec<String>>,
    }

    impl MessageKeeper for RecordingKeeper {
        async fn save_message(&self, message: &str) -> Result<i64, ClientError> {
            let mut saved = self.saved.borrow_mut();
            saved.push(message.to_string());
            Ok(saved.len() as i64)
        }

        async fn find_messages(&self, substring: &str) -> Result<Vec<String>, ClientError> {
            self.finds.borrow_mut().push(substring.to_string());
            Ok(self
                .saved
                .borrow()
                .iter()
                .filter(|m| m.contains(substring))
                .cloned()
                .collect())
        }
    }

    fn feeder() -> MessageFeeder<RecordingKeeper, StdRng> {
        MessageFeeder::new(RecordingKeeper::default(), StdRng::seed_from_u64(7))
    }

    #[test]
    fn test_random_substring_is_nonempty_substring() {
        let mut rng = StdRng::seed_from_u64(42);
        for line in ["a", "hello world", "ñandú über", "日本語のテキスト"] {
            for _ in 0..200 {
                let sub = random_substring(line, &mut rng);
                assert!(!sub.is_empty());
                assert!(line.contains(sub));
            }
        }
        assert_eq!(random_substring("", &mut rng), "");
    }

    #[tokio::test]
    async fn test_each_line_saves_then_finds() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "first line").unwrap();
        writeln!(file, "second line").unwrap();

        let mut feeder = feeder();
        let summary = feeder.process_file_lines(file.path()).await.unwrap();

        assert_eq!(summary.lines, 2);
        assert_eq!(summary.first_id, Some(1));
        assert_eq!(summary.last_id, Some(2));
        assert_eq!(summary.empty_finds, 0);

        let keeper = feeder.into_keeper();
        assert_eq!(
            *keeper.saved.borrow(),
            vec!["first line".to_string(), "second line".to_string()]
        );
        assert_eq!(keeper.finds.borrow().len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_replaced_not_fatal() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"first\ncaf\xe9\r\nthird\n").unwrap();

        let mut feeder = feeder();
        let summary = feeder.process_file_lines(file.path()).await.unwrap();

        assert_eq!(summary.lines, 3);
        assert_eq!(
            *feeder.into_keeper().saved.borrow(),
            vec![
                "first".to_string(),
                "caf\u{FFFD}".to_string(),
                "third".to_string()
            ]
        );
    }

    #[test]
    fn test_decode_line_strips_terminators() {
        assert_eq!(decode_line(b"abc\n"), "abc");
        assert_eq!(decode_line(b"abc\r\n"), "abc");
        assert_eq!(decode_line(b"abc"), "abc");
        assert_eq!(decode_line(b"\n"), "");
    }

    #[tokio::test]
    async fn test_stops_at_first_empty_line() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "one\n\ntwo\n").unwrap();

        let mut feeder = feeder();
        let summary = feeder.process_file_lines(file.path()).await.unwrap();

        assert_eq!(summary.lines, 1);
        assert_eq!(*feeder.into_keeper().saved.borrow(), vec!["one".to_string()]);
    }

    #[tokio::test]
    async fn test_empty_file_makes_no_calls() {
        let file = tempfile::NamedTempFile::new().unwrap();

        let mut feeder = feeder();
        let summary = feeder.process_file_lines(file.path()).await.unwrap();

        assert_eq!(summary, FeedSummary::default());
        let keeper = feeder.into_keeper();
        assert!(keeper.saved.borrow().is_empty());
        assert!(keeper.finds.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_missing_file_makes_no_calls() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.txt");

        let mut feeder = feeder();
        let err = feeder.process_file_lines(&missing).await.unwrap_err();

        assert!(matches!(err, ClientError::Io { .. }));
        assert!(feeder.into_keeper().saved.borrow().is_empty());
    }

    #[test]
    fn test_registry_addr() {
        let config = ClientConfig {
            registry_host: "10.0.0.5".to_string(),
            registry_port: 1199,
            ..Default::default()
        };
        assert_eq!(config.registry_addr(), "http://10.0.0.5:1199");
        assert_eq!(config.name, MESSAGE_KEEPER_NAME);
    }
}
