use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{info, warn};

use crate::models::{JobFailure, JobKey, JobKind, JobPayload, PredictionResult, SentimentResult, TrainedModel};

/// Longest stderr excerpt kept in a `ProcessFailure`.
const STDERR_TAIL_CHARS: usize = 2000;

/// Grace period for draining pipes after the process has exited.
const PIPE_DRAIN_GRACE: Duration = Duration::from_secs(5);

/// Runs the opaque computation behind a job key and reports exactly one outcome.
#[async_trait]
pub trait Invoker: Send + Sync {
    async fn invoke(&self, key: &JobKey) -> Result<JobPayload, JobFailure>;
}

/// Program, arguments and timeout for one job kind.
///
/// `{symbol}` and `{kind}` in the program or any argument are replaced per
/// invocation. Fixed tokens such as `{epochs}` are set with [`CommandSpec::with_var`].
#[derive(Debug, Clone, PartialEq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
    pub vars: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
            vars: Vec::new(),
        }
    }

    /// Replace `{name}` with `value` in every invocation.
    pub fn with_var(mut self, name: &str, value: impl ToString) -> Self {
        self.vars.push((format!("{{{}}}", name), value.to_string()));
        self
    }

    /// Build from a whitespace separated template such as
    /// `python3 train_model.py {symbol}`. Returns `None` for an empty template.
    pub fn from_template(template: &str, timeout: Duration) -> Option<Self> {
        let mut parts = template.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(program, parts.collect(), timeout))
    }

    fn render(&self, key: &JobKey) -> (String, Vec<String>) {
        let fill = |s: &str| {
            let filled = s
                .replace("{symbol}", key.symbol.as_str())
                .replace("{kind}", key.kind.as_str());
            self.vars
                .iter()
                .fold(filled, |acc, (token, value)| acc.replace(token.as_str(), value))
        };
        (fill(&self.program), self.args.iter().map(|a| fill(a)).collect())
    }
}

/// Launches the trainer / sentiment analyzer as child processes.
pub struct ProcessInvoker {
    train: CommandSpec,
    sentiment: CommandSpec,
    workdir: Option<PathBuf>,
}

impl ProcessInvoker {
    pub fn new(train: CommandSpec, sentiment: CommandSpec, workdir: Option<PathBuf>) -> Self {
        Self {
            train,
            sentiment,
            workdir,
        }
    }

    fn spec_for(&self, kind: JobKind) -> &CommandSpec {
        match kind {
            JobKind::Train => &self.train,
            JobKind::Sentiment => &self.sentiment,
        }
    }
}

#[async_trait]
impl Invoker for ProcessInvoker {
    async fn invoke(&self, key: &JobKey) -> Result<JobPayload, JobFailure> {
        let spec = self.spec_for(key.kind);
        let (program, args) = spec.render(key);

        let mut cmd = Command::new(&program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.workdir {
            cmd.current_dir(dir);
        }

        info!("🚀 Launching {} {:?} for {}", program, args, key);
        let output = run_with_timeout(cmd, &program, spec.timeout).await?;

        if !output.status.success() {
            let stderr = stderr_tail(&output.stderr);
            warn!("External process for {} exited with {}: {}", key, output.status, stderr);
            return Err(JobFailure::ProcessFailure {
                exit_code: output.status.code(),
                stderr,
            });
        }

        decode_payload(key, &output.stdout)
    }
}

#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// Spawn `cmd`, buffer both pipes, and kill the child if it outlives `timeout`.
pub async fn run_with_timeout(
    mut cmd: Command,
    program: &str,
    timeout: Duration,
) -> Result<ProcessOutput, JobFailure> {
    let mut child = cmd.spawn().map_err(|e| JobFailure::ProcessFailure {
        exit_code: None,
        stderr: format!("failed to launch {}: {}", program, e),
    })?;

    // Pipes must be drained while waiting or a chatty child blocks on write.
    let stdout_task = tokio::spawn(read_all(child.stdout.take()));
    let stderr_task = tokio::spawn(read_all(child.stderr.take()));

    let status = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => status,
        Ok(Err(e)) => {
            stdout_task.abort();
            stderr_task.abort();
            return Err(JobFailure::ProcessFailure {
                exit_code: None,
                stderr: format!("failed to wait for {}: {}", program, e),
            });
        }
        Err(_) => {
            warn!("⏱️ {} exceeded {:?}, killing it", program, timeout);
            if let Err(e) = child.kill().await {
                warn!("Failed to kill {}: {}", program, e);
            }
            stdout_task.abort();
            stderr_task.abort();
            return Err(JobFailure::Timeout {
                after_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            });
        }
    };

    // A grandchild may still hold the pipes open after the child exits.
    let stdout = tokio::time::timeout(PIPE_DRAIN_GRACE, stdout_task)
        .await
        .ok()
        .and_then(Result::ok)
        .unwrap_or_default();
    let stderr = tokio::time::timeout(PIPE_DRAIN_GRACE, stderr_task)
        .await
        .ok()
        .and_then(Result::ok)
        .unwrap_or_default();

    Ok(ProcessOutput { status, stdout, stderr })
}

async fn read_all<R: AsyncRead + Unpin>(pipe: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        if let Err(e) = pipe.read_to_end(&mut buf).await {
            warn!("Error reading child pipe: {}", e);
        }
    }
    buf
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    let len = text.chars().count();
    if len <= STDERR_TAIL_CHARS {
        text.to_string()
    } else {
        text.chars().skip(len - STDERR_TAIL_CHARS).collect()
    }
}

#[derive(Debug, Deserialize)]
struct TrainerOutput {
    last_actual_price: f64,
    next_day_prediction: f64,
    #[serde(alias = "training_range_descriptor")]
    training_range: String,
    #[serde(default)]
    model_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnalyzerOutput {
    #[serde(alias = "sentiment")]
    score: f64,
    #[serde(default)]
    headlines: Vec<String>,
}

fn decode_failure(reason: impl Into<String>) -> JobFailure {
    JobFailure::DecodeFailure { reason: reason.into() }
}

/// Decode a zero-exit process's stdout into the payload for `key.kind`.
pub fn decode_payload(key: &JobKey, stdout: &[u8]) -> Result<JobPayload, JobFailure> {
    let text = std::str::from_utf8(stdout)
        .map_err(|e| decode_failure(format!("stdout is not UTF-8: {}", e)))?;

    match key.kind {
        JobKind::Train => {
            let out: TrainerOutput = parse_document(text)?;
            if !out.last_actual_price.is_finite() || !out.next_day_prediction.is_finite() {
                return Err(decode_failure("trainer reported a non-finite price"));
            }
            Ok(JobPayload::Model(TrainedModel {
                symbol: key.symbol.clone(),
                prediction: PredictionResult {
                    last_actual_price: out.last_actual_price,
                    next_day_prediction: out.next_day_prediction,
                    training_range: out.training_range,
                },
                model_path: out.model_path,
            }))
        }
        JobKind::Sentiment => {
            let out: AnalyzerOutput = parse_document(text)?;
            if !(-1.0..=1.0).contains(&out.score) {
                return Err(decode_failure(format!(
                    "sentiment score {} outside [-1, 1]",
                    out.score
                )));
            }
            Ok(JobPayload::Sentiment(SentimentResult {
                score: out.score,
                headlines: out.headlines,
            }))
        }
    }
}

// Accepts the whole output, or its last non-empty line when the tool logs
// progress before printing the result document.
fn parse_document<T: DeserializeOwned>(text: &str) -> Result<T, JobFailure> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(decode_failure("empty output"));
    }

    match serde_json::from_str(trimmed) {
        Ok(doc) => Ok(doc),
        Err(whole) => trimmed
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .and_then(|line| serde_json::from_str(line).ok())
            .ok_or_else(|| decode_failure(whole.to_string())),
    }
}
