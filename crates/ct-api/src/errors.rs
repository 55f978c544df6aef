use ct_registry::RegistryError;
use ct_resolve::ResolutionFailure;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    Registry(RegistryError),
    Resolution(ResolutionFailure),
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Registry(err) => write!(f, "registry error: {err}"),
            Self::Resolution(err) => write!(f, "resolution error: {err}"),
        }
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Registry(err) => Some(err),
            Self::Resolution(err) => Some(err),
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        Self::Registry(err)
    }
}

impl From<ResolutionFailure> for ApiError {
    fn from(err: ResolutionFailure) -> Self {
        Self::Resolution(err)
    }
}
