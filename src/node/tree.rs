//! Tree front end over `roxmltree`.

use super::Node;

/// An element of a parsed `roxmltree` document.
#[derive(Debug, Clone, Copy)]
pub struct TreeNode<'a, 'input> {
    node: roxmltree::Node<'a, 'input>,
}

impl<'a, 'input> TreeNode<'a, 'input> {
    pub fn new(node: roxmltree::Node<'a, 'input>) -> Self {
        Self { node }
    }

    /// The document's root element.
    pub fn root(document: &'a roxmltree::Document<'input>) -> Self {
        Self::new(document.root_element())
    }

    pub fn inner(&self) -> roxmltree::Node<'a, 'input> {
        self.node
    }

    /// Child elements, in document order.
    pub fn child_elements(&self) -> impl Iterator<Item = TreeNode<'a, 'input>> {
        self.node
            .children()
            .filter(roxmltree::Node::is_element)
            .map(TreeNode::new)
    }
}

impl Node for TreeNode<'_, '_> {
    fn local_name(&self) -> &str {
        self.node.tag_name().name()
    }

    fn namespace(&self) -> Option<&str> {
        self.node.tag_name().namespace()
    }

    fn parent(&self) -> Option<Self> {
        self.node.parent_element().map(TreeNode::new)
    }

    fn attribute(&self, local_name: &str, namespace: Option<&str>) -> Option<&str> {
        self.node
            .attributes()
            .find(|a| a.name() == local_name && namespace.map_or(true, |ns| a.namespace() == Some(ns)))
            .map(|a| a.value())
    }

    fn attributes(&self) -> Vec<(String, String)> {
        self.node
            .attributes()
            .map(|a| (a.name().to_string(), a.value().to_string()))
            .collect()
    }

    fn text(&self) -> Option<String> {
        let mut text = String::new();
        let mut found = false;
        for child in self.node.children().filter(roxmltree::Node::is_text) {
            if let Some(t) = child.text() {
                text.push_str(t);
                found = true;
            }
        }
        found.then_some(text)
    }

    fn position(&self) -> usize {
        let name = self.node.tag_name();
        let mut position = 1;
        let mut sibling = self.node.prev_sibling_element();
        while let Some(s) = sibling {
            if s.tag_name() == name {
                position += 1;
            }
            sibling = s.prev_sibling_element();
        }
        position
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_navigation() {
        let doc = roxmltree::Document::parse(
            r#"<a xmlns:x="http://x"><b/><c x:k="v" k="w">hi</c><b/></a>"#,
        )
        .unwrap();
        let root = TreeNode::root(&doc);
        assert_eq!(root.local_name(), "a");
        assert!(root.parent().is_none());

        let children: Vec<_> = root.child_elements().collect();
        assert_eq!(children.len(), 3);
        assert_eq!(children[0].position(), 1);
        assert_eq!(children[2].position(), 2);
        assert_eq!(children[1].position(), 1);

        let c = children[1];
        assert_eq!(c.parent().map(|p| p.local_name().to_string()), Some("a".to_string()));
        assert_eq!(c.attribute("k", Some("http://x")), Some("v"));
        assert_eq!(c.attribute("k", None), Some("v"));
        assert_eq!(c.text(), Some("hi".to_string()));
        assert_eq!(children[0].text(), None);
    }
}
