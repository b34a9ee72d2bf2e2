//! Node navigation.
//!
//! Contextual matching is written once against [`Node`] and runs over both the
//! tree front end ([`tree::TreeNode`], backed by `roxmltree`) and the event
//! front end ([`stream::StreamNode`], backed by `quick-xml`).

pub mod stream;
pub mod tree;

/// Element navigation used by selector matching.
pub trait Node {
    /// Element local name (no prefix).
    fn local_name(&self) -> &str;

    /// Element namespace URI.
    fn namespace(&self) -> Option<&str>;

    /// Parent element, `None` for the document root element.
    fn parent(&self) -> Option<Self>
    where
        Self: Sized;

    /// Attribute value. A `None` namespace matches the local name in any namespace.
    fn attribute(&self, local_name: &str, namespace: Option<&str>) -> Option<&str>;

    /// All attributes as `(name, value)` pairs, in document order.
    fn attributes(&self) -> Vec<(String, String)>;

    /// Text content directly under the element, if available.
    fn text(&self) -> Option<String>;

    /// 1-based position among siblings with the same name.
    fn position(&self) -> usize;
}

/// Slash-separated path from the root element down to `node`.
pub fn element_path<N: Node>(node: &N) -> String {
    let mut names = vec![node.local_name().to_string()];
    let mut current = node.parent();
    while let Some(parent) = current {
        names.push(parent.local_name().to_string());
        current = parent.parent();
    }
    names.reverse();
    format!("/{}", names.join("/"))
}

/// Number of ancestors above `node`.
pub fn depth<N: Node>(node: &N) -> usize {
    let mut depth = 0;
    let mut current = node.parent();
    while let Some(parent) = current {
        depth += 1;
        current = parent.parent();
    }
    depth
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::tree::TreeNode;

    #[test]
    fn test_element_path() {
        let doc = roxmltree::Document::parse("<a><b><c/></b></a>").unwrap();
        let c = doc
            .descendants()
            .find(|n| n.has_tag_name("c"))
            .map(TreeNode::new)
            .unwrap();
        assert_eq!(element_path(&c), "/a/b/c");
        assert_eq!(depth(&c), 2);
    }
}
