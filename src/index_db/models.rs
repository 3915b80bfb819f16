use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InodeKind {
    File,
    Directory,
}

impl InodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InodeKind::File => "file",
            InodeKind::Directory => "directory",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "file" => Some(InodeKind::File),
            "directory" => Some(InodeKind::Directory),
            _ => None,
        }
    }
}

/// An entry of the inode index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inode {
    pub id: String,
    pub name: String,
    pub kind: InodeKind,
    /// Size in bytes, 0 for directories.
    pub size: u64,
    pub parent_id: Option<String>,
    /// Unix timestamp (seconds) of the last change seen by the ingest.
    pub updated_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inode_kind_round_trips_through_str() {
        for kind in [InodeKind::File, InodeKind::Directory] {
            assert_eq!(InodeKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(InodeKind::parse("symlink"), None);
    }

    #[test]
    fn test_inode_serializes_kind_lowercase() {
        let inode = Inode {
            id: "ino_1".to_string(),
            name: "notes".to_string(),
            kind: InodeKind::Directory,
            size: 0,
            parent_id: None,
            updated_at: 1_700_000_000,
        };
        let json = serde_json::to_string(&inode).unwrap();
        assert!(json.contains("\"kind\":\"directory\""));
        assert!(json.contains("\"parent_id\":null"));
    }
}
