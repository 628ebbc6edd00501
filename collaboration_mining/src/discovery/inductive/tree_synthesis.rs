use crate::process_tree::process_tree_struct::{
    Leaf, LeafLabel, Node, NodeId, OperatorType, ProcessTree,
};

use super::cut_node::{CutNode, DetectedCut};

fn node_of(cut_node: &CutNode) -> Node {
    match cut_node.detected_cut {
        DetectedCut::EmptyLog => Node::Leaf(Leaf::tau()),
        DetectedCut::SingleActivity => match &cut_node.activity {
            Some(a) => Node::Leaf(Leaf {
                label: LeafLabel::Activity(a.clone()),
                partner_process: cut_node.partner_process.clone(),
            }),
            None => Node::Leaf(Leaf::tau()),
        },
        DetectedCut::ReceiveMessageActivity => Node::Operator(OperatorType::ReceiveMessage),
        DetectedCut::SendMessageActivity => Node::Operator(OperatorType::SendMessage),
        DetectedCut::Sequential => Node::Operator(OperatorType::Sequence),
        DetectedCut::Concurrent | DetectedCut::EmptyTrace => {
            Node::Operator(OperatorType::ExclusiveChoice)
        }
        DetectedCut::Parallel
        | DetectedCut::ActivityOncePerTrace
        | DetectedCut::ActivityConcurrent => Node::Operator(OperatorType::Concurrency),
        DetectedCut::LoopCut
        | DetectedCut::StrictTauLoop
        | DetectedCut::TauLoop
        | DetectedCut::Flower => Node::Operator(OperatorType::Loop),
    }
}

fn add_tau(tree: &mut ProcessTree, parent: NodeId) {
    let tau = tree.add_node(Node::Leaf(Leaf::tau()));
    tree.push_child(parent, tau);
}

fn add_subtree(tree: &mut ProcessTree, parent: NodeId, cut_node: &CutNode) {
    let id = tree.add_node(node_of(cut_node));
    tree.push_child(parent, id);
    add_children(tree, id, cut_node);
}

fn add_children(tree: &mut ProcessTree, id: NodeId, cut_node: &CutNode) {
    match cut_node.detected_cut {
        DetectedCut::EmptyLog | DetectedCut::SingleActivity => {}
        DetectedCut::LoopCut => {
            let mut children = cut_node.children.iter();
            match children.next() {
                Some(body) => add_subtree(tree, id, body),
                None => add_tau(tree, id),
            }
            let redo: Vec<&CutNode> = children.collect();
            match redo.as_slice() {
                [] => add_tau(tree, id),
                [single] => add_subtree(tree, id, single),
                several => {
                    let choice = tree.add_node(Node::Operator(OperatorType::ExclusiveChoice));
                    tree.push_child(id, choice);
                    for c in several {
                        add_subtree(tree, choice, c);
                    }
                }
            }
        }
        DetectedCut::EmptyTrace => {
            add_tau(tree, id);
            for c in &cut_node.children {
                add_subtree(tree, id, c);
            }
        }
        DetectedCut::StrictTauLoop | DetectedCut::TauLoop => {
            match cut_node.children.first() {
                Some(body) => add_subtree(tree, id, body),
                None => add_tau(tree, id),
            }
            add_tau(tree, id);
        }
        DetectedCut::Flower => {
            let choice = tree.add_node(Node::Operator(OperatorType::ExclusiveChoice));
            tree.push_child(id, choice);
            if cut_node.children.is_empty() {
                add_tau(tree, choice);
            }
            for c in &cut_node.children {
                add_subtree(tree, choice, c);
            }
            add_tau(tree, id);
        }
        _ => {
            for c in &cut_node.children {
                add_subtree(tree, id, c);
            }
        }
    }
}

///
/// Turn the result of the mining recursion into a [`ProcessTree`] of process `process`
///
/// Loops always get exactly two children (body and redo, several redo parts are wrapped in an
/// exclusive choice). Afterwards, parent pointers are set, single-child flower choices collapsed,
/// the tree folded and the children of exclusive choices and concurrency nodes sorted by their
/// content hash.
///
pub fn synthesize_process_tree(process: &str, root: &CutNode) -> ProcessTree {
    let mut tree = ProcessTree::new(process, node_of(root));
    let root_id = tree.root();
    add_children(&mut tree, root_id, root);
    tree.fix_parent_pointers();
    tree.collapse_single_child_flower_choice();
    tree.fold();
    tree.sort();
    tree
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::MiningConfig,
        discovery::inductive::cut_node::MiningContext,
        event_log::activity_projection::ActivityLog,
    };

    fn synthesize(traces: &[Vec<&str>]) -> ProcessTree {
        let config = MiningConfig::default();
        let log = ActivityLog::from_str_traces(traces);
        let mut ctx = MiningContext::new(&config, &log, None);
        let root = CutNode::mine(log, &mut ctx);
        synthesize_process_tree("P", &root)
    }

    #[test]
    fn single_trace_single_activity_is_leaf() {
        let tree = synthesize(&[vec!["a"]]);
        assert_eq!(tree.to_string(), "'a'");
        assert!(tree.is_valid());
    }

    #[test]
    fn total_order_keeps_trace_order() {
        let tree = synthesize(&[vec!["d", "c", "b", "a"]]);
        assert_eq!(tree.to_string(), "->( 'd', 'c', 'b', 'a' )");
        assert_eq!(tree.leaf_activities(), vec!["d", "c", "b", "a"]);
    }

    #[test]
    fn loops_have_two_children() {
        let tree = synthesize(&[vec!["a", "b", "c", "a", "d", "a"], vec!["a"]]);
        assert!(tree.is_valid());
        for id in tree.preorder() {
            if tree.node(id) == &Node::Operator(OperatorType::Loop) {
                assert_eq!(tree.children(id).len(), 2);
            }
        }
        let root = tree.root();
        assert_eq!(tree.node(root), &Node::Operator(OperatorType::Loop));
        assert_eq!(tree.node(tree.children(root)[0]), &Node::Leaf(Leaf::activity("a")));
        assert_eq!(
            tree.node(tree.children(root)[1]),
            &Node::Operator(OperatorType::ExclusiveChoice)
        );
    }

    #[test]
    fn empty_trace_gives_optional_activity() {
        let tree = synthesize(&[vec!["a", "b"], vec!["a"]]);
        assert!(tree.is_valid());
        let shown = tree.to_string();
        assert!(shown == "->( 'a', X( tau, 'b' ) )" || shown == "->( 'a', X( 'b', tau ) )");
    }

    #[test]
    fn flower_over_single_activity_collapses_choice() {
        let config = MiningConfig {
            fall_throughs: crate::config::FallThroughConfig {
                strict_tau_loop: false,
                tau_loop: false,
                ..Default::default()
            },
            ..Default::default()
        };
        let log = ActivityLog::from_str_traces(&[vec!["a", "a"]]);
        let mut ctx = MiningContext::new(&config, &log, None);
        let root = CutNode::mine(log, &mut ctx);
        assert_eq!(root.detected_cut, DetectedCut::Flower);
        let tree = synthesize_process_tree("P", &root);
        assert_eq!(tree.to_string(), "*( 'a', tau )");
    }

    #[test]
    fn deterministic_across_runs() {
        let traces = [vec!["a", "b", "c"], vec!["a", "c", "b"], vec!["d"]];
        assert_eq!(synthesize(&traces).to_string(), synthesize(&traces).to_string());
    }
}
