use std::fmt::Display;

use crate::{
    bpmn::{layout::layouter::LayoutError, lowering::LoweringError},
    collaboration_graph::build_collaboration_graph::CollaborationGraphError,
    event_log::import_xes::XESParseError,
    utils::xml_utils::ExportError,
};

///
/// Error of any stage of collaboration discovery
///
#[derive(Debug)]
pub enum CollaborationMiningError {
    /// No party was given
    NoParties,
    /// Two parties share the same process name
    DuplicateParty(String),
    /// Importing the event log of a party failed
    Import {
        /// Party whose log could not be read
        party: String,
        /// Underlying parse error
        error: XESParseError,
    },
    /// Building the collaboration graph failed
    Graph(CollaborationGraphError),
    /// Converting the collaboration graph to BPMN failed
    Lowering(LoweringError),
    /// Layouting the diagram failed
    Layout(LayoutError),
    /// Writing a model failed
    Export(ExportError),
}

impl Display for CollaborationMiningError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollaborationMiningError::NoParties => write!(f, "No parties given"),
            CollaborationMiningError::DuplicateParty(name) => {
                write!(f, "Party {name} was given more than once")
            }
            CollaborationMiningError::Import { party, error } => {
                write!(f, "Could not import log of party {party}: {error}")
            }
            CollaborationMiningError::Graph(e) => write!(f, "{e}"),
            CollaborationMiningError::Lowering(e) => write!(f, "{e}"),
            CollaborationMiningError::Layout(e) => write!(f, "{e}"),
            CollaborationMiningError::Export(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for CollaborationMiningError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CollaborationMiningError::Import { error, .. } => Some(error),
            CollaborationMiningError::Graph(e) => Some(e),
            CollaborationMiningError::Lowering(e) => Some(e),
            CollaborationMiningError::Layout(e) => Some(e),
            CollaborationMiningError::Export(e) => Some(e),
            _ => None,
        }
    }
}

impl From<CollaborationGraphError> for CollaborationMiningError {
    fn from(e: CollaborationGraphError) -> Self {
        Self::Graph(e)
    }
}

impl From<LoweringError> for CollaborationMiningError {
    fn from(e: LoweringError) -> Self {
        Self::Lowering(e)
    }
}

impl From<LayoutError> for CollaborationMiningError {
    fn from(e: LayoutError) -> Self {
        Self::Layout(e)
    }
}

impl From<ExportError> for CollaborationMiningError {
    fn from(e: ExportError) -> Self {
        Self::Export(e)
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;

    #[test]
    fn wraps_stage_errors() {
        let e: CollaborationMiningError = LoweringError::InvalidLoop {
            label: "LOOP_A_0".into(),
            children: 3,
        }
        .into();
        assert!(matches!(e, CollaborationMiningError::Lowering(_)));
        assert!(e.source().is_some());
        assert!(e.to_string().contains("LOOP_A_0"));
        assert!(CollaborationMiningError::NoParties.source().is_none());
    }
}
