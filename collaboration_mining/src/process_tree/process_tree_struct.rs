use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::fmt::{self, Display};
use std::hash::{Hash, Hasher};

/// Index of a node in the arena of a [`ProcessTree`]
pub type NodeId = usize;

///
/// Label of a leaf in a process tree
///
#[derive(Debug, Clone, Serialize, Deserialize, Hash, Eq, PartialEq)]
pub enum LeafLabel {
    /// Non-silent activity leaf
    Activity(String),
    /// Silent activity leaf
    Tau,
}

///
/// Leaf in a process tree
///
/// Leaves below a [`OperatorType::ReceiveMessage`] or [`OperatorType::SendMessage`] node may
/// belong to another party, in which case `partner_process` names that party.
///
#[derive(Debug, Clone, Serialize, Deserialize, Hash, Eq, PartialEq)]
pub struct Leaf {
    /// Label of the leaf
    pub label: LeafLabel,
    /// Process owning the activity, if it is not the process of the tree itself
    pub partner_process: Option<String>,
}

impl Leaf {
    /// Local activity leaf
    pub fn activity<S: Into<String>>(activity: S) -> Self {
        Self {
            label: LeafLabel::Activity(activity.into()),
            partner_process: None,
        }
    }

    /// Activity leaf owned by another process
    pub fn partner<S: Into<String>, P: Into<String>>(activity: S, process: P) -> Self {
        Self {
            label: LeafLabel::Activity(activity.into()),
            partner_process: Some(process.into()),
        }
    }

    /// Silent leaf
    pub fn tau() -> Self {
        Self {
            label: LeafLabel::Tau,
            partner_process: None,
        }
    }

    /// Activity name (`None` for silent leaves)
    pub fn activity_name(&self) -> Option<&str> {
        match &self.label {
            LeafLabel::Activity(a) => Some(a),
            LeafLabel::Tau => None,
        }
    }
}

///
/// Operator type of an operator [`Node`]
///
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Hash, Eq, PartialEq)]
pub enum OperatorType {
    /// Sequence operator
    Sequence,
    /// Exclusive choice operator
    ExclusiveChoice,
    /// Concurrency operator
    Concurrency,
    /// Loop operator with exactly two children: body and redo
    Loop,
    /// Inclusive choice operator
    Or,
    /// Interleaving operator
    Interleaving,
    /// Message reception: partner (sender) leaves followed by the local receiver leaf
    ReceiveMessage,
    /// Message sending: the local sender leaf followed by partner (receiver) leaves
    SendMessage,
}

impl OperatorType {
    /// `true` for the two message operators
    pub fn is_message(&self) -> bool {
        matches!(self, OperatorType::ReceiveMessage | OperatorType::SendMessage)
    }

    /// Operators whose children order carries no meaning
    pub fn is_commutative(&self) -> bool {
        matches!(
            self,
            OperatorType::ExclusiveChoice
                | OperatorType::Concurrency
                | OperatorType::Or
                | OperatorType::Interleaving
        )
    }

    /// Symbol used in the textual notation
    pub fn symbol(&self) -> &'static str {
        match self {
            OperatorType::Sequence => "->",
            OperatorType::ExclusiveChoice => "X",
            OperatorType::Concurrency => "+",
            OperatorType::Loop => "*",
            OperatorType::Or => "O",
            OperatorType::Interleaving => "<>",
            OperatorType::ReceiveMessage => "rcv",
            OperatorType::SendMessage => "snd",
        }
    }

    /// Upper-case name of the operator
    pub fn name(&self) -> &'static str {
        match self {
            OperatorType::Sequence => "SEQUENCE",
            OperatorType::ExclusiveChoice => "XOR",
            OperatorType::Concurrency => "PARALLEL",
            OperatorType::Loop => "LOOP",
            OperatorType::Or => "OR",
            OperatorType::Interleaving => "INTERLEAVING",
            OperatorType::ReceiveMessage => "RECEIVE_MESSAGE",
            OperatorType::SendMessage => "SEND_MESSAGE",
        }
    }
}

///
/// Node in a process tree
///
#[derive(Debug, Clone, Serialize, Deserialize, Hash, Eq, PartialEq)]
pub enum Node {
    /// Operator node of a process tree
    Operator(OperatorType),
    /// Leaf node of a process tree
    Leaf(Leaf),
}

///
/// Process tree of one process (party), stored as an arena
///
/// Nodes reference their children and their parent by [`NodeId`].
///
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessTree {
    /// Name of the process the tree was mined for
    pub process: String,
    nodes: Vec<Node>,
    children: Vec<Vec<NodeId>>,
    parents: Vec<Option<NodeId>>,
    root: NodeId,
}

impl ProcessTree {
    ///
    /// Initializes a process tree with the given node as root
    ///
    pub fn new<S: Into<String>>(process: S, root: Node) -> Self {
        Self {
            process: process.into(),
            nodes: vec![root],
            children: vec![Vec::new()],
            parents: vec![None],
            root: 0,
        }
    }

    /// Root of the tree
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Make an existing node the root
    pub fn set_root(&mut self, id: NodeId) {
        self.root = id;
        self.parents[id] = None;
    }

    /// Node with the given id
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    /// Children of a node (empty for leaves)
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.children[id]
    }

    /// Parent of a node (`None` for the root or detached nodes)
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.parents[id]
    }

    /// Number of nodes reachable from the root
    pub fn len(&self) -> usize {
        self.preorder().len()
    }

    /// `true` if the tree has no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Add a detached node and return its id
    pub fn add_node(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        self.children.push(Vec::new());
        self.parents.push(None);
        self.nodes.len() - 1
    }

    /// Append `child` to the children of `parent`
    pub fn push_child(&mut self, parent: NodeId, child: NodeId) {
        self.children[parent].push(child);
        self.parents[child] = Some(parent);
    }

    /// Node ids reachable from the root, parents before children
    pub fn preorder(&self) -> Vec<NodeId> {
        let mut res = Vec::new();
        if self.nodes.is_empty() {
            return res;
        }
        let mut visited = HashSet::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            res.push(id);
            stack.extend(self.children[id].iter().rev());
        }
        res
    }

    ///
    /// Set the parent of every child according to the children lists (top-down from the root)
    ///
    pub fn fix_parent_pointers(&mut self) {
        self.parents.iter_mut().for_each(|p| *p = None);
        for id in self.preorder() {
            for &c in &self.children[id] {
                self.parents[c] = Some(id);
            }
        }
    }

    ///
    /// Replace a single-child exclusive choice which is the body of a loop by its child
    ///
    /// This is the shape of a flower model over a single activity.
    ///
    pub fn collapse_single_child_flower_choice(&mut self) {
        for id in self.preorder() {
            if self.nodes[id] != Node::Operator(OperatorType::Loop) {
                continue;
            }
            let Some(&body) = self.children[id].first() else {
                continue;
            };
            if self.nodes[body] == Node::Operator(OperatorType::ExclusiveChoice)
                && self.children[body].len() == 1
            {
                let only = self.children[body][0];
                self.children[id][0] = only;
                self.parents[only] = Some(id);
                self.parents[body] = None;
            }
        }
    }

    ///
    /// Fold the tree
    ///
    /// Operator nodes with a single child are replaced by that child, and sequences, exclusive
    /// choices and concurrency nodes directly nested in an operator of the same type are
    /// flattened into their parent. Loops and message operators are never flattened.
    ///
    pub fn fold(&mut self) {
        if self.nodes.is_empty() {
            return;
        }
        let mut folded = ProcessTree {
            process: self.process.clone(),
            nodes: Vec::new(),
            children: Vec::new(),
            parents: Vec::new(),
            root: 0,
        };
        let root = self.fold_into(self.root, &mut folded);
        folded.set_root(root);
        *self = folded.compacted();
    }

    fn fold_into(&self, id: NodeId, out: &mut ProcessTree) -> NodeId {
        match &self.nodes[id] {
            Node::Leaf(_) => out.add_node(self.nodes[id].clone()),
            Node::Operator(op) => {
                let kids = &self.children[id];
                if kids.len() == 1 && !op.is_message() && *op != OperatorType::Loop {
                    return self.fold_into(kids[0], out);
                }
                let new = out.add_node(Node::Operator(*op));
                let flattens = matches!(
                    op,
                    OperatorType::Sequence
                        | OperatorType::ExclusiveChoice
                        | OperatorType::Concurrency
                );
                for &k in kids {
                    let c = self.fold_into(k, out);
                    if flattens && out.nodes[c] == Node::Operator(*op) {
                        let grandchildren = std::mem::take(&mut out.children[c]);
                        for g in grandchildren {
                            out.push_child(new, g);
                        }
                    } else {
                        out.push_child(new, c);
                    }
                }
                new
            }
        }
    }

    /// Copy of the tree containing only the nodes reachable from the root (root gets id `0`)
    pub fn compacted(&self) -> ProcessTree {
        let mut res = ProcessTree::new(self.process.clone(), self.nodes[self.root].clone());
        let mut stack = vec![(self.root, 0)];
        while let Some((old, new)) = stack.pop() {
            for &c in &self.children[old] {
                let nc = res.add_node(self.nodes[c].clone());
                res.push_child(new, nc);
                stack.push((c, nc));
            }
        }
        res
    }

    ///
    /// Hash of the subtree rooted at `id`
    ///
    /// The hash does not depend on the children order of commutative operators.
    ///
    pub fn content_hash(&self, id: NodeId) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.nodes[id].hash(&mut hasher);
        let mut child_hashes: Vec<u64> = self.children[id]
            .iter()
            .map(|&c| self.content_hash(c))
            .collect();
        if let Node::Operator(op) = &self.nodes[id] {
            if op.is_commutative() {
                child_hashes.sort_unstable();
            }
        }
        child_hashes.hash(&mut hasher);
        hasher.finish()
    }

    ///
    /// Sort the children of exclusive choice and concurrency nodes by their [`ProcessTree::content_hash`]
    ///
    /// Children of all other operators keep their order.
    ///
    pub fn sort(&mut self) {
        for id in self.preorder() {
            if matches!(
                self.nodes[id],
                Node::Operator(OperatorType::ExclusiveChoice | OperatorType::Concurrency)
            ) {
                self.children[id] = self.children[id]
                    .iter()
                    .map(|&c| (self.content_hash(c), c))
                    .sorted_by_key(|(h, _)| *h)
                    .map(|(_, c)| c)
                    .collect();
            }
        }
    }

    ///
    /// For message operator nodes: the local leaf and the partner leaves
    ///
    pub fn message_endpoints(&self, id: NodeId) -> Option<(NodeId, Vec<NodeId>)> {
        match &self.nodes[id] {
            Node::Operator(op) if op.is_message() => {
                let (local, partners): (Vec<NodeId>, Vec<NodeId>) =
                    self.children[id].iter().copied().partition(|&c| {
                        matches!(&self.nodes[c], Node::Leaf(l) if l.partner_process.is_none())
                    });
                match local.as_slice() {
                    [l] => Some((*l, partners)),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    ///
    /// Returns `true` if all nodes have the right number of children, if the tree is acyclic
    /// and if all parent pointers match the children lists.
    ///
    /// Loops need exactly two children, message operators one local leaf and at least one
    /// partner leaf, all other operators at least one child.
    ///
    pub fn is_valid(&self) -> bool {
        if self.nodes.is_empty() || self.parents[self.root].is_some() {
            return false;
        }
        let mut visited: HashSet<NodeId> = HashSet::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                return false;
            }
            let kids = &self.children[id];
            let valid = match &self.nodes[id] {
                Node::Leaf(_) => kids.is_empty(),
                Node::Operator(OperatorType::Loop) => kids.len() == 2,
                Node::Operator(op) if op.is_message() => self
                    .message_endpoints(id)
                    .is_some_and(|(_, partners)| {
                        !partners.is_empty()
                            && partners.iter().all(|&p| matches!(self.nodes[p], Node::Leaf(_)))
                    }),
                Node::Operator(_) => !kids.is_empty(),
            };
            if !valid || kids.iter().any(|&c| self.parents[c] != Some(id)) {
                return false;
            }
            stack.extend(kids.iter().copied());
        }
        true
    }

    ///
    /// Returns all leaves in depth-first order
    ///
    pub fn find_all_leaves(&self) -> Vec<&Leaf> {
        self.preorder()
            .into_iter()
            .filter_map(|id| match &self.nodes[id] {
                Node::Leaf(l) => Some(l),
                Node::Operator(_) => None,
            })
            .collect()
    }

    /// Activity names of all non-silent leaves in depth-first order
    pub fn leaf_activities(&self) -> Vec<&str> {
        self.find_all_leaves()
            .into_iter()
            .filter_map(|l| l.activity_name())
            .collect()
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    fn fmt_node(&self, id: NodeId, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.nodes[id] {
            Node::Leaf(leaf) => match (&leaf.label, &leaf.partner_process) {
                (LeafLabel::Tau, _) => write!(f, "tau"),
                (LeafLabel::Activity(a), None) => write!(f, "'{a}'"),
                (LeafLabel::Activity(a), Some(p)) => write!(f, "'{p}:{a}'"),
            },
            Node::Operator(op) => {
                write!(f, "{}( ", op.symbol())?;
                for (i, &c) in self.children[id].iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    self.fmt_node(c, f)?;
                }
                write!(f, " )")
            }
        }
    }
}

impl Display for ProcessTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nodes.is_empty() {
            return Ok(());
        }
        self.fmt_node(self.root, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(tree: &mut ProcessTree, parent: NodeId, name: &str) -> NodeId {
        let id = tree.add_node(Node::Leaf(Leaf::activity(name)));
        tree.push_child(parent, id);
        id
    }

    fn op(tree: &mut ProcessTree, parent: NodeId, op: OperatorType) -> NodeId {
        let id = tree.add_node(Node::Operator(op));
        tree.push_child(parent, id);
        id
    }

    #[test]
    fn fold_removes_single_child_operators_and_flattens() {
        let mut tree = ProcessTree::new("P", Node::Operator(OperatorType::Sequence));
        let root = tree.root();
        leaf(&mut tree, root, "a");
        let nested = op(&mut tree, root, OperatorType::Sequence);
        leaf(&mut tree, nested, "b");
        let single = op(&mut tree, nested, OperatorType::ExclusiveChoice);
        leaf(&mut tree, single, "c");
        tree.fold();
        assert_eq!(tree.to_string(), "->( 'a', 'b', 'c' )");
        assert!(tree.is_valid());
        assert_eq!(tree.len(), 4);
    }

    #[test]
    fn loops_are_not_flattened() {
        let mut tree = ProcessTree::new("P", Node::Operator(OperatorType::Loop));
        let root = tree.root();
        let inner = op(&mut tree, root, OperatorType::Loop);
        leaf(&mut tree, inner, "a");
        let inner_tau = tree.add_node(Node::Leaf(Leaf::tau()));
        tree.push_child(inner, inner_tau);
        let tau = tree.add_node(Node::Leaf(Leaf::tau()));
        tree.push_child(root, tau);
        tree.fold();
        assert_eq!(tree.to_string(), "*( *( 'a', tau ), tau )");
        assert!(tree.is_valid());
    }

    #[test]
    fn sort_is_independent_of_initial_order() {
        let mut t1 = ProcessTree::new("P", Node::Operator(OperatorType::ExclusiveChoice));
        let r1 = t1.root();
        leaf(&mut t1, r1, "x");
        let s1 = op(&mut t1, r1, OperatorType::Sequence);
        leaf(&mut t1, s1, "y");
        leaf(&mut t1, s1, "z");

        let mut t2 = ProcessTree::new("P", Node::Operator(OperatorType::ExclusiveChoice));
        let r2 = t2.root();
        let s2 = op(&mut t2, r2, OperatorType::Sequence);
        leaf(&mut t2, s2, "y");
        leaf(&mut t2, s2, "z");
        leaf(&mut t2, r2, "x");

        assert_eq!(t1.content_hash(r1), t2.content_hash(r2));
        t1.sort();
        t2.sort();
        assert_eq!(t1.to_string(), t2.to_string());
        // Sequence children keep their order
        assert!(t1.to_string().contains("->( 'y', 'z' )"));
    }

    #[test]
    fn message_nodes_need_local_and_partner_leaves() {
        let mut tree = ProcessTree::new("B", Node::Operator(OperatorType::ReceiveMessage));
        let root = tree.root();
        let sender = tree.add_node(Node::Leaf(Leaf::partner("b", "A")));
        tree.push_child(root, sender);
        assert!(!tree.is_valid());
        let receiver = leaf(&mut tree, root, "c");
        assert!(tree.is_valid());
        assert_eq!(tree.message_endpoints(root), Some((receiver, vec![sender])));
        assert_eq!(tree.to_string(), "rcv( 'A:b', 'c' )");
        assert_eq!(tree.leaf_activities(), vec!["b", "c"]);
    }

    #[test]
    fn collapse_flower_over_single_activity() {
        let mut tree = ProcessTree::new("P", Node::Operator(OperatorType::Loop));
        let root = tree.root();
        let choice = op(&mut tree, root, OperatorType::ExclusiveChoice);
        leaf(&mut tree, choice, "a");
        let tau = tree.add_node(Node::Leaf(Leaf::tau()));
        tree.push_child(root, tau);
        tree.collapse_single_child_flower_choice();
        assert_eq!(tree.to_string(), "*( 'a', tau )");
        assert!(tree.is_valid());
    }

    #[test]
    fn wrong_parent_pointer_is_invalid() {
        let mut tree = ProcessTree::new("P", Node::Operator(OperatorType::Sequence));
        let root = tree.root();
        let a = leaf(&mut tree, root, "a");
        tree.parents[a] = None;
        assert!(!tree.is_valid());
        tree.fix_parent_pointers();
        assert!(tree.is_valid());
    }
}
