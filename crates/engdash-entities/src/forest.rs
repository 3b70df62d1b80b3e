use std::collections::{HashMap, HashSet, VecDeque};

use engdash_api::Entity;

/// Normalize a collection response into a forest.
///
/// Servers either nest `children` or only send `parent` references (or
/// both, with children repeated at the top level). Every record is
/// flattened by id, first occurrence winning, and linked again through
/// its parent id. Records whose parent is unknown become roots. Records
/// caught in a parent cycle are attached under the first of them met in
/// input order, with the edge that closes the cycle dropped.
pub fn build_forest(items: &[Entity]) -> Vec<Entity> {
    let mut order: Vec<i64> = Vec::new();
    let mut flat: HashMap<i64, Entity> = HashMap::new();
    let mut parent_of: HashMap<i64, Option<i64>> = HashMap::new();

    let mut stack: Vec<(&Entity, Option<i64>)> = items.iter().rev().map(|e| (e, None)).collect();
    while let Some((entity, implied_parent)) = stack.pop() {
        let Some(id) = entity.id else { continue };
        for child in entity.children.iter().rev() {
            stack.push((child, Some(id)));
        }
        if flat.contains_key(&id) {
            continue;
        }
        order.push(id);
        parent_of.insert(id, entity.parent_id().or(implied_parent));
        let mut node = entity.clone();
        node.children = Vec::new();
        flat.insert(id, node);
    }

    let mut children_of: HashMap<i64, Vec<i64>> = HashMap::new();
    let mut roots: Vec<i64> = Vec::new();
    for &id in &order {
        match parent_of.get(&id).copied().flatten() {
            Some(parent) if parent != id && flat.contains_key(&parent) => {
                children_of.entry(parent).or_default().push(id);
            }
            _ => roots.push(id),
        }
    }

    // Breadth-first from the roots; anything unreached sits on a cycle
    // and is promoted to a root in input order.
    let mut visited: HashSet<i64> = HashSet::new();
    let mut bfs: Vec<i64> = Vec::new();
    let mut top: Vec<i64> = Vec::new();
    let mut pending_roots: VecDeque<i64> = roots.into();
    let mut leftovers = order.iter();
    loop {
        let root = match pending_roots.pop_front() {
            Some(root) => root,
            None => match leftovers.by_ref().find(|id| !visited.contains(*id)) {
                Some(&id) => id,
                None => break,
            },
        };
        if !visited.insert(root) {
            continue;
        }
        top.push(root);
        let mut queue = VecDeque::from([root]);
        while let Some(id) = queue.pop_front() {
            bfs.push(id);
            for &child in children_of.get(&id).map(Vec::as_slice).unwrap_or(&[]) {
                if visited.insert(child) {
                    queue.push_back(child);
                }
            }
        }
    }

    // Children come after their parent in `bfs`, so building in reverse
    // finishes every subtree before its parent needs it.
    let mut built: HashMap<i64, Entity> = HashMap::new();
    for &id in bfs.iter().rev() {
        let Some(mut node) = flat.remove(&id) else { continue };
        node.children = children_of
            .get(&id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
            .iter()
            .filter_map(|child| built.remove(child))
            .collect();
        built.insert(id, node);
    }

    top.iter().filter_map(|id| built.remove(id)).collect()
}

/// Every record of a forest, parents before children.
pub fn flatten(forest: &[Entity]) -> Vec<&Entity> {
    let mut out = Vec::new();
    let mut stack: Vec<&Entity> = forest.iter().rev().collect();
    while let Some(node) = stack.pop() {
        out.push(node);
        stack.extend(node.children.iter().rev());
    }
    out
}
