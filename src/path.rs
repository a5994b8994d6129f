use std::any::Any;
use std::fmt;

use crate::Document;

/// Opaque per-component user data, owned by the path and dropped when the
/// component pops.
pub type UserData = Box<dyn Any>;

/// The key under which a mapping component is being addressed.
pub enum PathKey {
    /// A simple scalar key.
    Scalar(String),
    /// A complex key, kept as a document fragment.
    Complex(Document),
}

impl fmt::Display for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathKey::Scalar(value) => f.write_str(value),
            PathKey::Complex(doc) => match doc.to_flow_string() {
                Ok(text) => f.write_str(text.trim_end()),
                Err(_) => f.write_str("<complex>"),
            },
        }
    }
}

/// One level of the composer's position: a mapping with its current key, or
/// a sequence with its current index.
pub enum PathComponent {
    Mapping {
        /// The key of the entry being visited. `None` while a key is
        /// expected.
        key: Option<PathKey>,
        /// True between the key event and its value.
        in_key: bool,
        /// True until the first key arrives: the component cannot accept
        /// keys or values yet.
        root: bool,
        /// User data for the mapping itself.
        data: Option<UserData>,
        /// User data for the current key.
        key_data: Option<UserData>,
    },
    Sequence {
        /// Index of the entry being visited; -1 until the first item.
        index: i64,
        /// True until the first item arrives.
        root: bool,
        /// User data for the sequence.
        data: Option<UserData>,
    },
}

impl PathComponent {
    pub(crate) fn mapping() -> Self {
        PathComponent::Mapping {
            key: None,
            in_key: false,
            root: true,
            data: None,
            key_data: None,
        }
    }

    pub(crate) fn sequence() -> Self {
        PathComponent::Sequence {
            index: -1,
            root: true,
            data: None,
        }
    }

    pub fn is_mapping(&self) -> bool {
        matches!(self, PathComponent::Mapping { .. })
    }

    pub fn is_sequence(&self) -> bool {
        matches!(self, PathComponent::Sequence { .. })
    }

    /// Whether the component is still a bare collection root, unable to
    /// accept keys or values.
    pub fn is_collection_root(&self) -> bool {
        match self {
            PathComponent::Mapping { root, .. } | PathComponent::Sequence { root, .. } => *root,
        }
    }

    /// Whether a mapping component is positioned on its key.
    pub fn in_key(&self) -> bool {
        matches!(self, PathComponent::Mapping { in_key: true, .. })
    }

    /// The current key of a mapping component.
    pub fn key(&self) -> Option<&PathKey> {
        match self {
            PathComponent::Mapping { key, .. } => key.as_ref(),
            PathComponent::Sequence { .. } => None,
        }
    }

    /// The current index of a sequence component.
    pub fn index(&self) -> Option<i64> {
        match self {
            PathComponent::Sequence { index, .. } => Some(*index),
            PathComponent::Mapping { .. } => None,
        }
    }

    /// Attach user data to the component.
    pub fn set_user_data(&mut self, value: UserData) {
        match self {
            PathComponent::Mapping { data, .. } | PathComponent::Sequence { data, .. } => {
                *data = Some(value);
            }
        }
    }

    pub fn user_data(&self) -> Option<&dyn Any> {
        match self {
            PathComponent::Mapping { data, .. } | PathComponent::Sequence { data, .. } => {
                data.as_deref()
            }
        }
    }

    /// Attach user data to the current key of a mapping component.
    pub fn set_key_user_data(&mut self, value: UserData) {
        if let PathComponent::Mapping { key_data, .. } = self {
            *key_data = Some(value);
        }
    }

    pub fn key_user_data(&self) -> Option<&dyn Any> {
        match self {
            PathComponent::Mapping { key_data, .. } => key_data.as_deref(),
            PathComponent::Sequence { .. } => None,
        }
    }
}

impl fmt::Display for PathComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathComponent::Mapping { key: Some(key), .. } => write!(f, "/{key}"),
            PathComponent::Mapping { key: None, .. } => Ok(()),
            PathComponent::Sequence { index, .. } => {
                if *index >= 0 {
                    write!(f, "/{index}")
                } else {
                    Ok(())
                }
            }
        }
    }
}

/// The composer's live position: a stack of path components.
///
/// While a complex key is being composed the composer swaps in a child path
/// whose [`Path::parent`] is the outer one; depth and display then describe
/// the position inside the key.
#[derive(Default)]
pub struct Path {
    components: Vec<PathComponent>,
    parent: Option<Box<Path>>,
    root_data: Option<UserData>,
}

impl Path {
    pub fn new() -> Self {
        Path {
            components: Vec::with_capacity(16),
            parent: None,
            root_data: None,
        }
    }

    /// The number of live components: the nesting depth from the document
    /// root (or from the complex key's own root when [`Path::parent`] is
    /// set).
    pub fn depth(&self) -> usize {
        self.components.len()
    }

    /// The enclosing path while a complex key is being built.
    pub fn parent(&self) -> Option<&Path> {
        self.parent.as_deref()
    }

    pub fn components(&self) -> &[PathComponent] {
        &self.components
    }

    pub fn last(&self) -> Option<&PathComponent> {
        self.components.last()
    }

    pub fn last_mut(&mut self) -> Option<&mut PathComponent> {
        self.components.last_mut()
    }

    /// User data attached to the document root position.
    pub fn set_root_data(&mut self, value: UserData) {
        self.root_data = Some(value);
    }

    pub fn root_data(&self) -> Option<&dyn Any> {
        self.root_data.as_deref()
    }

    pub(crate) fn push(&mut self, component: PathComponent) {
        self.components.push(component);
    }

    pub(crate) fn pop(&mut self) -> Option<PathComponent> {
        self.components.pop()
    }

    pub(crate) fn take_parent(&mut self) -> Option<Box<Path>> {
        self.parent.take()
    }

    pub(crate) fn set_parent(&mut self, parent: Box<Path>) {
        self.parent = Some(parent);
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.components.is_empty() {
            return f.write_str("/");
        }
        for component in &self.components {
            write!(f, "{component}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Path({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_walks_the_components() {
        let mut path = Path::new();
        assert_eq!(path.to_string(), "/");
        let mut map = PathComponent::mapping();
        if let PathComponent::Mapping { key, root, .. } = &mut map {
            *key = Some(PathKey::Scalar(String::from("users")));
            *root = false;
        }
        path.push(map);
        let mut seq = PathComponent::sequence();
        if let PathComponent::Sequence { index, root, .. } = &mut seq {
            *index = 0;
            *root = false;
        }
        path.push(seq);
        assert_eq!(path.to_string(), "/users/0");
        assert_eq!(path.depth(), 2);
    }

    #[test]
    fn user_data_slots_are_independent() {
        let mut component = PathComponent::mapping();
        component.set_user_data(Box::new(17u32));
        component.set_key_user_data(Box::new(String::from("k")));
        assert_eq!(
            component.user_data().and_then(|d| d.downcast_ref::<u32>()),
            Some(&17)
        );
        assert_eq!(
            component
                .key_user_data()
                .and_then(|d| d.downcast_ref::<String>())
                .map(String::as_str),
            Some("k")
        );
    }
}
