//! Defines the core abstraction for a navigable, read-only document tree.
use std::hash::Hash;

pub mod xml;

/// A qualified name, consisting of an optional prefix, the namespace it is bound
/// to, and a local part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QName<'a> {
    pub prefix: Option<&'a str>,
    pub namespace_uri: Option<&'a str>,
    pub local_part: &'a str,
}

impl<'a> QName<'a> {
    pub fn local(local_part: &'a str) -> Self {
        Self {
            prefix: None,
            namespace_uri: None,
            local_part,
        }
    }

    /// The lexical form, `prefix:local` or just `local`.
    pub fn lexical(&self) -> String {
        match self.prefix {
            Some(prefix) if !prefix.is_empty() => format!("{}:{}", prefix, self.local_part),
            _ => self.local_part.to_string(),
        }
    }
}

/// The type of a node in the document tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    Root,
    Element,
    Attribute,
    Text,
    Comment,
    ProcessingInstruction,
}

/// The contract for a node in a read-only, hierarchical document.
///
/// The evaluator is written exclusively against this trait, so rules can run
/// over any tree that implements it. Nodes are small handles: copying one is
/// cheap and `Ord` must follow document order.
///
/// `'a` is the lifetime of the underlying document.
pub trait DataSourceNode<'a>:
    std::fmt::Debug + Clone + Copy + PartialEq + Eq + Hash + PartialOrd + Ord
{
    /// The type of the node (Element, Text, Attribute, etc.).
    fn node_type(&self) -> NodeType;

    /// The qualified name of the node. Returns `None` for text, comment and root
    /// nodes. For a processing-instruction, this is its target.
    fn name(&self) -> Option<QName<'a>>;

    /// The string value of the node.
    /// - For a text node, this is its content.
    /// - For an element or the root, the concatenation of all descendant text.
    /// - For an attribute, this is its value.
    fn string_value(&self) -> String;

    /// An iterator over the attribute nodes of this node.
    fn attributes(&self) -> Box<dyn Iterator<Item = Self> + 'a>;

    /// An iterator over the child nodes of this node, in document order.
    fn children(&self) -> Box<dyn Iterator<Item = Self> + 'a>;

    /// The parent node. An attribute's parent is its owner element.
    fn parent(&self) -> Option<Self>;

    /// True when the node has at least one element child.
    fn has_element_children(&self) -> bool {
        self.children()
            .any(|child| child.node_type() == NodeType::Element)
    }
}

// Test utilities - publicly available for integration testing in downstream crates
pub mod tests {
    use super::*;
    use std::cmp::Ordering;
    use std::hash::Hasher;

    #[derive(Debug, Clone)]
    struct MockNodeData<'a> {
        node_type: NodeType,
        name: Option<QName<'a>>,
        value: String,
        parent: Option<usize>,
        children: Vec<usize>,
        attributes: Vec<usize>,
    }

    /// An arena of nodes whose ids are assigned in document order.
    #[derive(Debug, Default)]
    pub struct MockTree<'a> {
        nodes: Vec<MockNodeData<'a>>,
    }

    impl<'a> MockTree<'a> {
        fn push(
            &mut self,
            parent: Option<usize>,
            node_type: NodeType,
            name: Option<QName<'a>>,
            value: &str,
        ) -> usize {
            let id = self.nodes.len();
            self.nodes.push(MockNodeData {
                node_type,
                name,
                value: value.to_string(),
                parent,
                children: vec![],
                attributes: vec![],
            });
            if let Some(pid) = parent {
                if node_type == NodeType::Attribute {
                    self.nodes[pid].attributes.push(id);
                } else {
                    self.nodes[pid].children.push(id);
                }
            }
            id
        }

        pub fn node(&'a self, id: usize) -> MockNode<'a> {
            MockNode { id, tree: self }
        }
    }

    /// A handle into a [`MockTree`]; ordering by id is document order.
    #[derive(Debug, Clone, Copy)]
    pub struct MockNode<'a> {
        pub id: usize,
        pub tree: &'a MockTree<'a>,
    }

    impl<'a> PartialEq for MockNode<'a> {
        fn eq(&self, other: &Self) -> bool {
            self.id == other.id
        }
    }
    impl<'a> Eq for MockNode<'a> {}

    impl<'a> PartialOrd for MockNode<'a> {
        fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
            Some(self.cmp(other))
        }
    }
    impl<'a> Ord for MockNode<'a> {
        fn cmp(&self, other: &Self) -> Ordering {
            self.id.cmp(&other.id)
        }
    }

    impl<'a> Hash for MockNode<'a> {
        fn hash<H: Hasher>(&self, state: &mut H) {
            self.id.hash(state);
        }
    }

    impl<'a> DataSourceNode<'a> for MockNode<'a> {
        fn node_type(&self) -> NodeType {
            self.tree.nodes[self.id].node_type
        }

        fn name(&self) -> Option<QName<'a>> {
            self.tree.nodes[self.id].name
        }

        fn string_value(&self) -> String {
            let data = &self.tree.nodes[self.id];
            match data.node_type {
                NodeType::Root | NodeType::Element => self
                    .children()
                    .filter(|c| matches!(c.node_type(), NodeType::Text | NodeType::Element))
                    .map(|c| c.string_value())
                    .collect(),
                _ => data.value.clone(),
            }
        }

        fn attributes(&self) -> Box<dyn Iterator<Item = Self> + 'a> {
            let tree = self.tree;
            let ids = tree.nodes[self.id].attributes.clone();
            Box::new(ids.into_iter().map(move |id| MockNode { id, tree }))
        }

        fn children(&self) -> Box<dyn Iterator<Item = Self> + 'a> {
            let tree = self.tree;
            let ids = tree.nodes[self.id].children.clone();
            Box::new(ids.into_iter().map(move |id| MockNode { id, tree }))
        }

        fn parent(&self) -> Option<Self> {
            self.tree.nodes[self.id].parent.map(|pid| MockNode {
                id: pid,
                tree: self.tree,
            })
        }
    }

    /// Creates a small invoice document for testing:
    /// ```text
    /// (root)                                  0
    ///   <invoice>                             1
    ///     <item sku="A1" qty="2">Widget</item> 2, attrs 3 4, text 5
    ///     <item sku="B2" qty="0">Gadget</item> 6, attrs 7 8, text 9
    ///     <!-- audit -->                      10
    ///     <note xml:lang="en">paid</note>     11, attr 12, text 13
    ///   </invoice>
    /// ```
    pub fn create_test_tree<'a>() -> MockTree<'a> {
        let mut tree = MockTree::default();
        let root = tree.push(None, NodeType::Root, None, "");
        let invoice = tree.push(
            Some(root),
            NodeType::Element,
            Some(QName::local("invoice")),
            "",
        );
        for (sku, qty, text) in [("A1", "2", "Widget"), ("B2", "0", "Gadget")] {
            let item = tree.push(
                Some(invoice),
                NodeType::Element,
                Some(QName::local("item")),
                "",
            );
            tree.push(
                Some(item),
                NodeType::Attribute,
                Some(QName::local("sku")),
                sku,
            );
            tree.push(
                Some(item),
                NodeType::Attribute,
                Some(QName::local("qty")),
                qty,
            );
            tree.push(Some(item), NodeType::Text, None, text);
        }
        tree.push(Some(invoice), NodeType::Comment, None, " audit ");
        let note = tree.push(
            Some(invoice),
            NodeType::Element,
            Some(QName::local("note")),
            "",
        );
        tree.push(
            Some(note),
            NodeType::Attribute,
            Some(QName {
                prefix: Some("xml"),
                namespace_uri: Some("http://www.w3.org/XML/1998/namespace"),
                local_part: "lang",
            }),
            "en",
        );
        tree.push(Some(note), NodeType::Text, None, "paid");
        tree
    }

    #[test]
    fn test_mock_tree_string_values() {
        let tree = create_test_tree();
        assert_eq!(tree.node(0).string_value(), "WidgetGadgetpaid");
        assert_eq!(tree.node(2).string_value(), "Widget");
        assert_eq!(tree.node(4).string_value(), "2");
        assert!(tree.node(1).has_element_children());
        assert!(!tree.node(2).has_element_children());
        assert_eq!(tree.node(12).name().map(|q| q.lexical()).as_deref(), Some("xml:lang"));
    }
}
