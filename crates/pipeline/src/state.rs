use std::fmt;

/// Lifecycle of one asset. `Assembled` and `Failed` are terminal.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum AssetState {
    #[default]
    Idle,
    Dispatching,
    Fetching,
    Parsing,
    ResolvingMaterials,
    Binding,
    Normalizing,
    Assembled,
    Failed(String),
}

impl AssetState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Assembled | Self::Failed(_))
    }
}

impl fmt::Display for AssetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(reason) => write!(f, "failed: {reason}"),
            other => fmt::Debug::fmt(other, f),
        }
    }
}
