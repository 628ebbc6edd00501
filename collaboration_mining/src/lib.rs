#![warn(
    clippy::doc_markdown,
    missing_debug_implementations,
    rust_2018_idioms,
    missing_docs
)]

#![doc = include_str!("../README.md")]

///
/// Event logs of the collaborating parties
///
pub mod event_log {
    /// Projection of event logs to activity sequences
    pub mod activity_projection;
    /// Attribute keys and values
    pub mod constants;
    /// [`EventLog`] struct and sub-structs
    pub mod event_log_struct;
    /// XES Import
    pub mod import_xes;
    pub use event_log_struct::{
        Attribute, AttributeValue, Attributes, Event, EventLog, MessageKind, Party, Trace,
        XESEditableAttribute,
    };
    #[cfg(test)]
    mod tests;
}

/// Configuration of mining and layout
pub mod config;

///
/// Directly-follows graph
///
pub mod dfg {
    /// [`DirectlyFollowsGraph`] struct
    pub mod dfg_struct;

    #[doc(inline)]
    pub use crate::dfg::dfg_struct::DirectlyFollowsGraph;
}

///
/// Process Discovery
///
/// Message correlation between parties and inductive mining of one process tree per party.
///
pub mod discovery {
    /// Inductive miner with message leaves
    pub mod inductive;
    /// Matching of send and receive events across parties
    pub mod message_correlation;
}

///
/// Process trees with message operators
///
pub mod process_tree {
    /// [`ProcessTree`] struct
    pub mod process_tree_struct;

    #[doc(inline)]
    pub use crate::process_tree::process_tree_struct::ProcessTree;
}

///
/// Collaboration graph: all process trees below one global start, connected by message edges
///
pub mod collaboration_graph {
    /// Building the [`CollaborationGraph`] from process trees
    pub mod build_collaboration_graph;
    /// [`CollaborationGraph`] struct
    pub mod collaboration_graph_struct;
    /// Export [`CollaborationGraph`] to `.ptml`
    pub mod export_ptml;

    #[doc(inline)]
    pub use crate::collaboration_graph::collaboration_graph_struct::CollaborationGraph;
}

///
/// BPMN collaboration diagrams
///
pub mod bpmn {
    /// [`BpmnDiagram`] struct
    pub mod bpmn_struct;
    /// Export [`BpmnDiagram`] to `.bpmn` (BPMN 2.0 XML with diagram interchange)
    pub mod export_bpmn;
    /// Conversion of a [`crate::CollaborationGraph`] to a [`BpmnDiagram`]
    pub mod lowering;
    /// Message-specific element kinds and removal of duplicate elements
    pub mod promotion;

    ///
    /// Node placement and flow routing
    ///
    pub mod layout {
        /// Built-in layered layout backend
        pub mod layered;
        /// Sizes, anchors, waypoints and the [`layouter::LayoutBackend`] trait
        pub mod layouter;
        #[cfg(feature = "graphviz-export")]
        /// Layout backend using graphviz `dot`
        ///
        /// __Requires the `graphviz-export` feature to be enabled__
        ///
        /// Also requires an active graphviz installation in the PATH.
        /// See also <https://github.com/besok/graphviz-rust?tab=readme-ov-file#caveats> and <https://graphviz.org/download/>
        pub mod graphviz;
    }

    #[doc(inline)]
    pub use crate::bpmn::bpmn_struct::BpmnDiagram;
}

/// Util module with smaller helper functions, structs or enums
pub mod utils {
    /// Helper utils regarding XML import/export
    pub mod xml_utils;
}

/// Errors spanning all stages
pub mod error;
/// End-to-end collaboration discovery
pub mod pipeline;

#[doc(inline)]
pub use config::{CollaborationMiningConfig, LayoutConfig, MiningConfig};

#[doc(inline)]
pub use event_log::import_xes::import_xes_file;

#[doc(inline)]
pub use event_log::import_xes::import_xes_slice;

#[doc(inline)]
pub use event_log::import_xes::XESImportOptions;

#[doc(inline)]
pub use event_log::event_log_struct::{EventLog, Party};

#[doc(inline)]
pub use dfg::DirectlyFollowsGraph;

#[doc(inline)]
pub use process_tree::ProcessTree;

#[doc(inline)]
pub use collaboration_graph::CollaborationGraph;

#[doc(inline)]
pub use collaboration_graph::export_ptml::export_collaboration_graph_to_ptml_path;

#[doc(inline)]
pub use bpmn::BpmnDiagram;

#[doc(inline)]
pub use bpmn::export_bpmn::export_bpmn_path;

#[doc(inline)]
pub use error::CollaborationMiningError;

#[doc(inline)]
pub use pipeline::{discover_collaboration, load_parties, CollaborationDiscovery};
