use http::StatusCode;

/// Every way a retag run can fail. All of them are terminal: the pipeline
/// stops at the first one and nothing already mounted is rolled back.
#[derive(thiserror::Error, Debug)]
pub enum RetagError {
    #[error("Invalid image reference '{reference}': {reason}")]
    ReferenceParse {
        reference: String,
        reason: &'static str,
    },

    #[error("Images not in the same registry: source is on '{source_registry}', destination is on '{destination_registry}'")]
    CrossRegistry {
        source_registry: String,
        destination_registry: String,
    },

    #[error("Unable to contact the registry at {uri}")]
    RegistryUnreachable {
        uri: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Registry {registry} needs authentication, please supply --user and --pass")]
    AuthRequired { registry: String },

    #[error("Unable to parse the WWW-Authenticate challenge '{header}': {reason}")]
    AuthChallengeParse { header: String, reason: String },

    #[error("Failed to obtain a token from {realm}")]
    TokenRequest {
        realm: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to fetch manifest {reference}")]
    ManifestFetch {
        reference: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Manifest {reference} is not a valid schema 2 image manifest")]
    ManifestDecode {
        reference: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed checking whether blob {digest} is present in {repository}")]
    BlobCheck {
        digest: String,
        repository: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to mount blob {digest} into {repository} from {from}")]
    BlobMount {
        digest: String,
        repository: String,
        from: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to publish manifest {reference}")]
    ManifestPublish {
        reference: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Cause attached to a stage error when the registry answered, but not with
/// the status code the protocol requires.
#[derive(thiserror::Error, Debug)]
#[error("expected status {expected}, got {actual}; body:\n{body}")]
pub struct UnexpectedStatus {
    pub expected: String,
    pub actual: StatusCode,
    pub body: String,
}

impl UnexpectedStatus {
    pub fn new(expected: impl Into<String>, actual: StatusCode, body: String) -> Self {
        UnexpectedStatus {
            expected: expected.into(),
            actual,
            body,
        }
    }
}
