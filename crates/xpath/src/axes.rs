//! Pure functions for collecting nodes along each axis.
//!
//! Every collector returns nodes in axis order: document order for forward
//! axes, nearest-first for reverse axes. Positional predicates count in that order.

use crate::ast::Axis;
use crate::datasource::{DataSourceNode, NodeType};

/// Collects the nodes reachable from `node` along `axis`.
pub fn collect_axis<'a, N: DataSourceNode<'a>>(axis: Axis, node: N) -> Vec<N> {
    let mut results = Vec::new();
    match axis {
        Axis::Child => collect_child_nodes(node, &mut results),
        Axis::Descendant => collect_descendant_nodes(node, &mut results),
        Axis::DescendantOrSelf => collect_descendant_or_self_nodes(node, &mut results),
        Axis::Attribute => collect_attribute_nodes(node, &mut results),
        Axis::Parent => collect_parent_nodes(node, &mut results),
        Axis::Ancestor => collect_ancestor_nodes(node, &mut results),
        Axis::AncestorOrSelf => {
            results.push(node);
            collect_ancestor_nodes(node, &mut results);
        }
        Axis::SelfAxis => results.push(node),
        Axis::FollowingSibling => collect_following_sibling_nodes(node, &mut results),
        Axis::PrecedingSibling => collect_preceding_sibling_nodes(node, &mut results),
        Axis::Following => collect_following_nodes(node, &mut results),
        Axis::Preceding => collect_preceding_nodes(node, &mut results),
    }
    results
}

pub fn collect_child_nodes<'a, N: DataSourceNode<'a>>(node: N, results: &mut Vec<N>) {
    results.extend(node.children());
}

pub fn collect_attribute_nodes<'a, N: DataSourceNode<'a>>(node: N, results: &mut Vec<N>) {
    results.extend(node.attributes());
}

pub fn collect_descendant_nodes<'a, N: DataSourceNode<'a>>(node: N, results: &mut Vec<N>) {
    for child in node.children() {
        results.push(child);
        collect_descendant_nodes(child, results);
    }
}

pub fn collect_descendant_or_self_nodes<'a, N: DataSourceNode<'a>>(
    node: N,
    results: &mut Vec<N>,
) {
    results.push(node);
    collect_descendant_nodes(node, results);
}

pub fn collect_parent_nodes<'a, N: DataSourceNode<'a>>(node: N, results: &mut Vec<N>) {
    results.extend(node.parent());
}

pub fn collect_ancestor_nodes<'a, N: DataSourceNode<'a>>(node: N, results: &mut Vec<N>) {
    let mut current = node.parent();
    while let Some(p) = current {
        results.push(p);
        current = p.parent();
    }
}

pub fn collect_following_sibling_nodes<'a, N: DataSourceNode<'a>>(
    node: N,
    results: &mut Vec<N>,
) {
    if node.node_type() == NodeType::Attribute {
        return;
    }
    if let Some(parent) = node.parent() {
        results.extend(parent.children().skip_while(|s| *s != node).skip(1));
    }
}

pub fn collect_preceding_sibling_nodes<'a, N: DataSourceNode<'a>>(
    node: N,
    results: &mut Vec<N>,
) {
    if node.node_type() == NodeType::Attribute {
        return;
    }
    if let Some(parent) = node.parent() {
        let start = results.len();
        results.extend(parent.children().take_while(|s| *s != node));
        results[start..].reverse();
    }
}

pub fn collect_following_nodes<'a, N: DataSourceNode<'a>>(node: N, results: &mut Vec<N>) {
    // Everything after an attribute starts with its owner's content.
    if node.node_type() == NodeType::Attribute {
        if let Some(owner) = node.parent() {
            collect_descendant_nodes(owner, results);
        }
    }
    let mut current = Some(node);
    while let Some(c) = current {
        let parent = c.parent();
        if let Some(p) = parent {
            if c.node_type() != NodeType::Attribute {
                for sibling in p.children().skip_while(|s| *s != c).skip(1) {
                    collect_descendant_or_self_nodes(sibling, results);
                }
            }
        }
        current = parent;
    }
}

pub fn collect_preceding_nodes<'a, N: DataSourceNode<'a>>(node: N, results: &mut Vec<N>) {
    let start = results.len();
    let mut chain = Vec::new();
    let mut current = Some(node);
    while let Some(c) = current {
        chain.push(c);
        current = c.parent();
    }
    // Walk from the top so the collected run is in document order, then flip it.
    for pair in chain.windows(2).rev() {
        let (c, p) = (pair[0], pair[1]);
        if c.node_type() == NodeType::Attribute {
            continue;
        }
        for sibling in p.children().take_while(|s| *s != c) {
            collect_descendant_or_self_nodes(sibling, results);
        }
    }
    results[start..].reverse();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::tests::create_test_tree;

    #[test]
    fn test_collect_child() {
        let tree = create_test_tree();
        let invoice = tree.node(1);
        let ids: Vec<_> = collect_axis(Axis::Child, invoice).iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![2, 6, 10, 11]);
    }

    #[test]
    fn test_collect_descendant_in_document_order() {
        let tree = create_test_tree();
        let ids: Vec<_> = collect_axis(Axis::Descendant, tree.node(0))
            .iter()
            .map(|n| n.id)
            .collect();
        // Attributes are not descendants.
        assert_eq!(ids, vec![1, 2, 5, 6, 9, 10, 11, 13]);
    }

    #[test]
    fn test_collect_ancestor_is_nearest_first() {
        let tree = create_test_tree();
        let text = tree.node(5);
        let ids: Vec<_> = collect_axis(Axis::Ancestor, text).iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![2, 1, 0]);

        let ids: Vec<_> = collect_axis(Axis::AncestorOrSelf, tree.node(3))
            .iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(ids, vec![3, 2, 1, 0]);
    }

    #[test]
    fn test_collect_siblings() {
        let tree = create_test_tree();
        let first_item = tree.node(2);
        let note = tree.node(11);

        let following: Vec<_> = collect_axis(Axis::FollowingSibling, first_item)
            .iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(following, vec![6, 10, 11]);

        let preceding: Vec<_> = collect_axis(Axis::PrecedingSibling, note)
            .iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(preceding, vec![10, 6, 2]);

        // Attributes have no siblings.
        assert!(collect_axis(Axis::FollowingSibling, tree.node(3)).is_empty());
    }

    #[test]
    fn test_collect_following_preceding() {
        let tree = create_test_tree();
        let widget_text = tree.node(5);
        let following: Vec<_> = collect_axis(Axis::Following, widget_text)
            .iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(following, vec![6, 9, 10, 11, 13]);

        let preceding: Vec<_> = collect_axis(Axis::Preceding, tree.node(10))
            .iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(preceding, vec![9, 6, 5, 2]);
    }

    #[test]
    fn test_following_from_attribute_includes_owner_content() {
        let tree = create_test_tree();
        let sku = tree.node(3);
        let following: Vec<_> = collect_axis(Axis::Following, sku).iter().map(|n| n.id).collect();
        assert_eq!(following, vec![5, 6, 9, 10, 11, 13]);
    }
}
