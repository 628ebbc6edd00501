use std::collections::{HashMap, HashSet};

use itertools::Itertools;
use petgraph::{
    algo::tarjan_scc,
    graph::{DiGraph, NodeIndex},
    unionfind::UnionFind,
    visit::Bfs,
};
use serde::Serialize;

use crate::{dfg::DirectlyFollowsGraph, event_log::activity_projection::Activity};

///
/// A structural cut: a partition of the activities of a [`DirectlyFollowsGraph`] into at least two groups
///
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Cut {
    /// Groups are totally ordered by reachability
    Sequence(Vec<Vec<Activity>>),
    /// No relations between groups
    ExclusiveChoice(Vec<Vec<Activity>>),
    /// Relations in both directions between all activities of different groups
    Parallel(Vec<Vec<Activity>>),
    /// First group is the body (containing all start and end activities), all others are redo groups
    Loop(Vec<Vec<Activity>>),
}

impl Cut {
    /// Groups of the cut
    pub fn groups(&self) -> &[Vec<Activity>] {
        match self {
            Cut::Sequence(g) | Cut::ExclusiveChoice(g) | Cut::Parallel(g) | Cut::Loop(g) => g,
        }
    }
}

///
/// Try all structural cuts in order (sequence, exclusive choice, parallel, loop)
///
/// The first cut found is returned. Loop cuts are not considered for logs containing empty
/// traces.
///
pub fn detect_cut(dfg: &DirectlyFollowsGraph, log_has_empty_trace: bool) -> Option<Cut> {
    if dfg.activities().len() < 2 {
        return None;
    }
    if let Some(groups) = detect_sequence_cut(dfg) {
        return Some(Cut::Sequence(groups));
    }
    if let Some(groups) = detect_exclusive_choice_cut(dfg) {
        return Some(Cut::ExclusiveChoice(groups));
    }
    if let Some(groups) = detect_parallel_cut(dfg) {
        return Some(Cut::Parallel(groups));
    }
    if !log_has_empty_trace {
        if let Some(groups) = detect_loop_cut(dfg) {
            return Some(Cut::Loop(groups));
        }
    }
    None
}

fn to_activities(dfg: &DirectlyFollowsGraph, groups: Vec<Vec<usize>>) -> Vec<Vec<Activity>> {
    let acts = dfg.activities();
    groups
        .into_iter()
        .map(|g| g.into_iter().map(|i| acts[i].clone()).collect())
        .collect()
}

/// Components of a union-find structure, each sorted, ordered by their smallest element
fn components(uf: &UnionFind<usize>, nodes: impl Iterator<Item = usize>) -> Vec<Vec<usize>> {
    let mut by_rep: HashMap<usize, Vec<usize>> = HashMap::new();
    let mut reps: Vec<usize> = Vec::new();
    for n in nodes {
        let rep = uf.find(n);
        let entry = by_rep.entry(rep).or_insert_with(|| {
            reps.push(rep);
            Vec::new()
        });
        entry.push(n);
    }
    let mut res: Vec<Vec<usize>> = reps
        .into_iter()
        .filter_map(|r| by_rep.remove(&r))
        .map(|mut g| {
            g.sort_unstable();
            g
        })
        .collect();
    res.sort_by_key(|g| g[0]);
    res
}

/// Nodes reachable from every node (each node reaches itself)
fn reachability(graph: &DiGraph<Activity, u32>) -> Vec<HashSet<usize>> {
    graph
        .node_indices()
        .map(|n| {
            let mut reached = HashSet::new();
            let mut bfs = Bfs::new(graph, n);
            while let Some(m) = bfs.next(graph) {
                reached.insert(m.index());
            }
            reached
        })
        .collect()
}

fn group_reaches(reach: &[HashSet<usize>], from: &[usize], to: &[usize]) -> bool {
    from.iter().any(|a| to.iter().any(|b| reach[*a].contains(b)))
}

///
/// Sequence cut: strongly connected components, merged while pairwise unreachable, ordered by reachability
///
/// The resulting order must be strict: every activity of an earlier group reaches every activity
/// of a later group, and no activity of a later group reaches an earlier one.
///
pub fn detect_sequence_cut(dfg: &DirectlyFollowsGraph) -> Option<Vec<Vec<Activity>>> {
    let graph = dfg.as_digraph();
    let reach = reachability(&graph);

    let mut groups: Vec<Vec<usize>> = tarjan_scc(&graph)
        .into_iter()
        .map(|scc| scc.into_iter().map(NodeIndex::index).sorted_unstable().collect_vec())
        .sorted_by_key(|g| g[0])
        .collect();

    loop {
        let mut merge: Option<(usize, usize)> = None;
        'search: for i in 0..groups.len() {
            for j in (i + 1)..groups.len() {
                if !group_reaches(&reach, &groups[i], &groups[j])
                    && !group_reaches(&reach, &groups[j], &groups[i])
                {
                    merge = Some((i, j));
                    break 'search;
                }
            }
        }
        match merge {
            Some((i, j)) => {
                let g = groups.remove(j);
                groups[i].extend(g);
                groups[i].sort_unstable();
            }
            None => break,
        }
    }
    if groups.len() < 2 {
        return None;
    }

    let predecessor_count: Vec<usize> = groups
        .iter()
        .enumerate()
        .map(|(i, g)| {
            groups
                .iter()
                .enumerate()
                .filter(|(j, h)| *j != i && group_reaches(&reach, h, g))
                .count()
        })
        .collect();
    let mut order: Vec<usize> = (0..groups.len()).collect();
    order.sort_by_key(|i| predecessor_count[*i]);
    let ordered: Vec<Vec<usize>> = order.into_iter().map(|i| groups[i].clone()).collect();

    for i in 0..ordered.len() {
        for j in (i + 1)..ordered.len() {
            for a in &ordered[i] {
                for b in &ordered[j] {
                    if !reach[*a].contains(b) || reach[*b].contains(a) {
                        return None;
                    }
                }
            }
        }
    }
    Some(to_activities(dfg, ordered))
}

///
/// Exclusive choice cut: connected components of the (undirected) graph
///
pub fn detect_exclusive_choice_cut(dfg: &DirectlyFollowsGraph) -> Option<Vec<Vec<Activity>>> {
    let n = dfg.activities().len();
    let index: HashMap<&str, usize> = dfg
        .activities()
        .iter()
        .enumerate()
        .map(|(i, a)| (a.as_str(), i))
        .collect();
    let mut uf = UnionFind::new(n);
    for (from, to, _) in dfg.relations() {
        uf.union(index[from.as_str()], index[to.as_str()]);
    }
    let groups = components(&uf, 0..n);
    if groups.len() < 2 {
        return None;
    }
    Some(to_activities(dfg, groups))
}

///
/// Parallel cut: connected components of the negated graph
///
/// Every group needs a start and an end activity. Groups lacking one are merged into the first
/// group that has both.
///
pub fn detect_parallel_cut(dfg: &DirectlyFollowsGraph) -> Option<Vec<Vec<Activity>>> {
    let n = dfg.activities().len();
    let index: HashMap<&str, usize> = dfg
        .activities()
        .iter()
        .enumerate()
        .map(|(i, a)| (a.as_str(), i))
        .collect();
    let mut uf = UnionFind::new(n);
    for (from, to) in dfg.negated_relations() {
        uf.union(index[from.as_str()], index[to.as_str()]);
    }
    let acts = dfg.activities();
    let (mut valid, invalid): (Vec<Vec<usize>>, Vec<Vec<usize>>) =
        components(&uf, 0..n).into_iter().partition(|g| {
            g.iter().any(|&a| dfg.is_start_activity(&acts[a]))
                && g.iter().any(|&a| dfg.is_end_activity(&acts[a]))
        });
    if valid.len() < 2 {
        return None;
    }
    for g in invalid {
        valid[0].extend(g);
    }
    valid[0].sort_unstable();
    Some(to_activities(dfg, valid))
}

///
/// Loop cut: the body holds all start and end activities, redo groups are the connected
/// components of the remaining activities
///
/// A redo group must only be entered from end activities (from all of them) and only be left to
/// start activities (to all of them). Offending groups are merged into the body until no group
/// changes anymore.
///
pub fn detect_loop_cut(dfg: &DirectlyFollowsGraph) -> Option<Vec<Vec<Activity>>> {
    let acts = dfg.activities();
    let n = acts.len();
    let index: HashMap<&str, usize> = acts
        .iter()
        .enumerate()
        .map(|(i, a)| (a.as_str(), i))
        .collect();
    let starts: HashSet<usize> = dfg
        .start_activities
        .iter()
        .filter_map(|a| index.get(a.as_str()).copied())
        .collect();
    let ends: HashSet<usize> = dfg
        .end_activities
        .iter()
        .filter_map(|a| index.get(a.as_str()).copied())
        .collect();
    let mut body: HashSet<usize> = starts.union(&ends).copied().collect();
    if body.is_empty() {
        return None;
    }

    let edges: Vec<(usize, usize)> = dfg
        .relations()
        .map(|(f, t, _)| (index[f.as_str()], index[t.as_str()]))
        .collect();
    let mut uf = UnionFind::new(n);
    for &(f, t) in &edges {
        if !body.contains(&f) && !body.contains(&t) {
            uf.union(f, t);
        }
    }
    let mut redo_groups = components(&uf, (0..n).filter(|a| !body.contains(a)));

    loop {
        let offending = redo_groups.iter().position(|group| {
            let in_group: HashSet<usize> = group.iter().copied().collect();
            edges.iter().any(|&(f, t)| {
                // Entering the group from the body, but not from an end activity
                (in_group.contains(&t) && body.contains(&f) && !ends.contains(&f))
                    // Leaving the group to the body, but not to a start activity
                    || (in_group.contains(&f) && body.contains(&t) && !starts.contains(&t))
            }) || group.iter().any(|a| {
                let from_ends = ends.iter().filter(|e| edges.contains(&(**e, *a))).count();
                let to_starts = starts.iter().filter(|s| edges.contains(&(*a, **s))).count();
                (from_ends > 0 && from_ends < ends.len())
                    || (to_starts > 0 && to_starts < starts.len())
            })
        });
        match offending {
            Some(i) => {
                let group = redo_groups.remove(i);
                body.extend(group);
            }
            None => break,
        }
    }
    if redo_groups.is_empty() {
        return None;
    }
    let mut body: Vec<usize> = body.into_iter().collect();
    body.sort_unstable();
    let mut groups = vec![body];
    groups.extend(redo_groups);
    Some(to_activities(dfg, groups))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_log::activity_projection::ActivityLog;

    fn dfg(traces: &[Vec<&str>]) -> DirectlyFollowsGraph {
        DirectlyFollowsGraph::create_from_log(&ActivityLog::from_str_traces(traces))
    }

    #[test]
    fn sequence_cut_follows_trace_order() {
        let cut = detect_cut(&dfg(&[vec!["a", "b", "c"], vec!["a", "c"]]), false);
        assert_eq!(
            cut,
            Some(Cut::Sequence(vec![
                vec!["a".to_string()],
                vec!["b".to_string()],
                vec!["c".to_string()]
            ]))
        );
    }

    #[test]
    fn sequence_cut_merges_unreachable_components() {
        let cut = detect_sequence_cut(&dfg(&[vec!["a", "b", "d"], vec!["a", "c", "d"]])).unwrap();
        assert_eq!(cut, vec![vec!["a"], vec!["b", "c"], vec!["d"]]);
    }

    #[test]
    fn exclusive_choice_cut() {
        let cut = detect_cut(&dfg(&[vec!["a", "b"], vec!["c"]]), false);
        assert_eq!(
            cut,
            Some(Cut::ExclusiveChoice(vec![
                vec!["a".to_string(), "b".to_string()],
                vec!["c".to_string()]
            ]))
        );
    }

    #[test]
    fn parallel_cut() {
        let cut = detect_cut(&dfg(&[vec!["a", "b"], vec!["b", "a"]]), false);
        assert_eq!(
            cut,
            Some(Cut::Parallel(vec![vec!["a".to_string()], vec!["b".to_string()]]))
        );
    }

    #[test]
    fn loop_cut() {
        let graph = dfg(&[vec!["a", "b"], vec!["a", "b", "c", "a", "b"]]);
        assert!(detect_sequence_cut(&graph).is_none());
        let cut = detect_cut(&graph, false);
        assert_eq!(
            cut,
            Some(Cut::Loop(vec![
                vec!["a".to_string(), "b".to_string()],
                vec!["c".to_string()]
            ]))
        );
        assert_eq!(detect_cut(&graph, true), None);
    }

    #[test]
    fn loop_cut_rejects_redo_entered_from_middle_of_body() {
        // c is entered from m, which is neither start nor end activity
        let graph = dfg(&[vec!["a", "m", "b"], vec!["a", "m", "c", "a", "m", "b"]]);
        assert_eq!(detect_loop_cut(&graph), None);
    }

    #[test]
    fn single_activity_has_no_cut() {
        assert_eq!(detect_cut(&dfg(&[vec!["a", "a"]]), false), None);
    }
}
