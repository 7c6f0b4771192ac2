use thiserror::Error;

/// Recoverable failures inside the guardian.
///
/// A Block verdict is not an error; it is the designed output of the policy
/// engine. `Network` and `Parse` are always recovered locally (next provider or
/// fail open). `InvalidConfig` is raised at the configuration boundary.
#[derive(Debug, Error)]
pub enum GuardianError {
    #[error("network failure: {0}")]
    Network(#[from] reqwest::Error),

    #[error("unexpected response: {0}")]
    Parse(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
