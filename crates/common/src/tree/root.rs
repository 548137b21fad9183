use crate::linked_data::{BlockEncoded, Cid, CodecError, LinkMap, LD_CBOR_CODEC, LD_RAW_CODEC};
use crate::store::{cat_link, BlockStore, StoreError};

/// Link names of a tree root. Every format version shares this layout so the
///  version can be read before anything else about the tree is known.
pub const VERSION_LINK: &str = "version";
pub const PUBLIC_LINK: &str = "public";
pub const PRIVATE_LINK: &str = "private";

#[derive(Debug, thiserror::Error)]
pub enum RootError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("root {0} has no {1:?} link")]
    MissingLink(Cid, &'static str),
    #[error("version marker is not valid utf-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// The decoded root block of a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RootBlock {
    pub version: Cid,
    pub public: Cid,
    pub private: Cid,
}

impl RootBlock {
    pub async fn load<S: BlockStore + ?Sized>(store: &S, root: &Cid) -> Result<Self, RootError> {
        let links = LinkMap::decode(&store.get(root).await?)?;
        let link = |name: &'static str| {
            links
                .get(name)
                .copied()
                .ok_or(RootError::MissingLink(*root, name))
        };
        Ok(Self {
            version: link(VERSION_LINK)?,
            public: link(PUBLIC_LINK)?,
            private: link(PRIVATE_LINK)?,
        })
    }

    /// Write the version marker and the root block, returning the root's CID.
    pub async fn store<S: BlockStore + ?Sized>(
        store: &S,
        version: &str,
        public: Cid,
        private: Cid,
    ) -> Result<Cid, RootError> {
        let version = store.put(LD_RAW_CODEC, version.as_bytes().to_vec()).await?;
        let links: LinkMap = [
            (VERSION_LINK.to_string(), version),
            (PUBLIC_LINK.to_string(), public),
            (PRIVATE_LINK.to_string(), private),
        ]
        .into_iter()
        .collect();
        Ok(store.put(LD_CBOR_CODEC, links.encode()?).await?)
    }
}

/// Read the version marker of the tree at `root`.
pub async fn read_version<S: BlockStore + ?Sized>(store: &S, root: &Cid) -> Result<String, RootError> {
    let bytes = cat_link(store, root, VERSION_LINK).await?;
    Ok(String::from_utf8(bytes.to_vec())?)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::linked_data::cid_for;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_store_and_load_root() {
        let store = MemoryStore::new();
        let public = cid_for(LD_CBOR_CODEC, b"public");
        let private = cid_for(LD_RAW_CODEC, b"private");

        let root = RootBlock::store(&store, "1.0.0", public, private)
            .await
            .unwrap();
        let block = RootBlock::load(&store, &root).await.unwrap();

        assert_eq!(block.public, public);
        assert_eq!(block.private, private);
        assert_eq!(read_version(&store, &root).await.unwrap(), "1.0.0");
    }

    #[tokio::test]
    async fn test_missing_version_link() {
        let store = MemoryStore::new();
        let links: LinkMap = [("public".to_string(), cid_for(LD_RAW_CODEC, b"p"))]
            .into_iter()
            .collect();
        let root = store.put(LD_CBOR_CODEC, links.encode().unwrap()).await.unwrap();

        assert!(matches!(
            read_version(&store, &root).await,
            Err(RootError::Store(StoreError::MissingLink(_, name))) if name == "version"
        ));
        assert!(matches!(
            RootBlock::load(&store, &root).await,
            Err(RootError::MissingLink(_, "version"))
        ));
    }
}
