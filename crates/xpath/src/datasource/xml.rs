//! A [`DataSourceNode`] adapter over `roxmltree` documents.
use super::{DataSourceNode, NodeType, QName};
use roxmltree::Node;
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// An owned parse of an XML string.
pub struct XmlDocument<'input> {
    doc: roxmltree::Document<'input>,
}

impl<'input> XmlDocument<'input> {
    pub fn parse(text: &'input str) -> Result<Self, roxmltree::Error> {
        let doc = roxmltree::Document::parse(text)?;
        Ok(Self { doc })
    }

    /// The document node, parent of the document element.
    pub fn root_node(&self) -> XmlNode<'_, 'input> {
        XmlNode::Tree(self.doc.root())
    }

    /// The outermost element.
    pub fn document_element(&self) -> XmlNode<'_, 'input> {
        XmlNode::Tree(self.doc.root_element())
    }
}

/// Either a tree node or an attribute.
///
/// `roxmltree` stores attributes as data on their element, so an attribute is
/// addressed by its owner and its index.
#[derive(Debug, Clone, Copy)]
pub enum XmlNode<'a, 'input> {
    /// Root, element, text, comment or processing instruction.
    Tree(Node<'a, 'input>),
    Attribute {
        owner: Node<'a, 'input>,
        index: usize,
    },
}

impl<'a, 'input> XmlNode<'a, 'input> {
    pub fn inner(&self) -> Option<Node<'a, 'input>> {
        match self {
            XmlNode::Tree(node) => Some(*node),
            XmlNode::Attribute { .. } => None,
        }
    }

    // (node id, attribute slot); the element itself sorts before its attributes.
    fn order_key(&self) -> (u32, usize) {
        match self {
            XmlNode::Tree(node) => (node.id().get(), 0),
            XmlNode::Attribute { owner, index } => (owner.id().get(), index + 1),
        }
    }
}

impl PartialEq for XmlNode<'_, '_> {
    fn eq(&self, other: &Self) -> bool {
        self.order_key() == other.order_key()
    }
}

impl Eq for XmlNode<'_, '_> {}

impl PartialOrd for XmlNode<'_, '_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for XmlNode<'_, '_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.order_key().cmp(&other.order_key())
    }
}

impl Hash for XmlNode<'_, '_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.order_key().hash(state);
    }
}

impl<'a> DataSourceNode<'a> for XmlNode<'a, 'a> {
    fn node_type(&self) -> NodeType {
        match self {
            XmlNode::Tree(node) => match node.node_type() {
                roxmltree::NodeType::Root => NodeType::Root,
                roxmltree::NodeType::Element => NodeType::Element,
                roxmltree::NodeType::Text => NodeType::Text,
                roxmltree::NodeType::Comment => NodeType::Comment,
                roxmltree::NodeType::PI => NodeType::ProcessingInstruction,
            },
            XmlNode::Attribute { .. } => NodeType::Attribute,
        }
    }

    fn name(&self) -> Option<QName<'a>> {
        match self {
            XmlNode::Tree(node) if node.is_element() => {
                let tag = node.tag_name();
                let namespace_uri = tag.namespace();
                Some(QName {
                    prefix: namespace_uri.and_then(|uri| node.lookup_prefix(uri)),
                    namespace_uri,
                    local_part: tag.name(),
                })
            }
            XmlNode::Tree(node) => node.pi().map(|pi| QName::local(pi.target)),
            XmlNode::Attribute { owner, index } => owner.attributes().nth(*index).map(|attr| {
                let namespace_uri = attr.namespace();
                let prefix = match namespace_uri {
                    Some(XML_NAMESPACE) => Some("xml"),
                    Some(uri) => owner.lookup_prefix(uri),
                    None => None,
                };
                QName {
                    prefix,
                    namespace_uri,
                    local_part: attr.name(),
                }
            }),
        }
    }

    fn string_value(&self) -> String {
        match self {
            XmlNode::Tree(node) => match node.node_type() {
                roxmltree::NodeType::Root | roxmltree::NodeType::Element => node
                    .descendants()
                    .filter(|n| n.is_text())
                    .filter_map(|n| n.text())
                    .collect(),
                roxmltree::NodeType::PI => node
                    .pi()
                    .and_then(|pi| pi.value)
                    .unwrap_or_default()
                    .to_string(),
                _ => node.text().unwrap_or_default().to_string(),
            },
            XmlNode::Attribute { owner, index } => owner
                .attributes()
                .nth(*index)
                .map(|attr| attr.value().to_string())
                .unwrap_or_default(),
        }
    }

    fn attributes(&self) -> Box<dyn Iterator<Item = Self> + 'a> {
        match self {
            XmlNode::Tree(node) => {
                let owner = *node;
                let count = node.attributes().len();
                Box::new((0..count).map(move |index| XmlNode::Attribute { owner, index }))
            }
            XmlNode::Attribute { .. } => Box::new(std::iter::empty()),
        }
    }

    fn children(&self) -> Box<dyn Iterator<Item = Self> + 'a> {
        match self {
            XmlNode::Tree(node) => Box::new(node.children().map(XmlNode::Tree)),
            XmlNode::Attribute { .. } => Box::new(std::iter::empty()),
        }
    }

    fn parent(&self) -> Option<Self> {
        match self {
            XmlNode::Tree(node) => node.parent().map(XmlNode::Tree),
            XmlNode::Attribute { owner, .. } => Some(XmlNode::Tree(*owner)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find_child<'a>(node: XmlNode<'a, 'a>, local: &str) -> XmlNode<'a, 'a> {
        node.children()
            .find(|n| n.name().is_some_and(|q| q.local_part == local))
            .unwrap()
    }

    #[test]
    fn test_xml_node_attributes() {
        let xml = r#"<invoice><item sku="A1" qty="3">Widget</item></invoice>"#;
        let doc = XmlDocument::parse(xml).unwrap();
        let item = find_child(doc.document_element(), "item");

        let attrs: Vec<_> = item.attributes().collect();
        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs[0].node_type(), NodeType::Attribute);
        assert_eq!(attrs[0].name().unwrap().local_part, "sku");
        assert_eq!(attrs[1].string_value(), "3");
        assert_eq!(attrs[0].parent(), Some(item));
        assert!(item < attrs[0] && attrs[0] < attrs[1]);
    }

    #[test]
    fn test_nodes_sort_in_document_order() {
        let xml = r#"<order><item qty="1">a</item><item qty="2"/></order>"#;
        let doc = XmlDocument::parse(xml).unwrap();
        let order = doc.document_element();
        let items: Vec<_> = order.children().collect();
        let qty = items[0].attributes().next().unwrap();
        let text = items[0].children().next().unwrap();

        let mut nodes = vec![items[1], text, qty, order, items[0], qty];
        nodes.sort();
        nodes.dedup();
        assert_eq!(nodes, vec![order, items[0], qty, text, items[1]]);
    }

    #[test]
    fn test_xml_namespaces_are_reported() {
        let xml = r#"<inv:invoice xmlns:inv="urn:inv" xml:lang="en"><inv:line/></inv:invoice>"#;
        let doc = XmlDocument::parse(xml).unwrap();
        let invoice = doc.document_element();
        let name = invoice.name().unwrap();
        assert_eq!(name.namespace_uri, Some("urn:inv"));
        assert_eq!(name.prefix, Some("inv"));
        assert_eq!(name.lexical(), "inv:invoice");

        let lang = invoice.attributes().next().unwrap().name().unwrap();
        assert_eq!(lang.lexical(), "xml:lang");
    }

    #[test]
    fn test_root_string_value_and_type() {
        let doc = XmlDocument::parse("<a>x<b>y</b><!-- c --></a>").unwrap();
        let root = doc.root_node();
        assert_eq!(root.node_type(), NodeType::Root);
        assert_eq!(root.string_value(), "xy");
        assert!(doc.document_element().has_element_children());
    }
}
