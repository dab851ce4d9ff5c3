//! Version 1 B-tree nodes (`TREE`): group nodes (type 0) and raw-data chunk nodes (type 1).

#[cfg(not(feature = "std"))]
use alloc::{vec, vec::Vec};

use crate::bytes::{ensure_len, is_undefined, read_u16, read_u32, read_uint};
use crate::error::FormatError;

/// Node type of group B-trees.
pub const NODE_TYPE_GROUP: u8 = 0;
/// Node type of chunked dataset B-trees.
pub const NODE_TYPE_CHUNK: u8 = 1;

/// One chunk as recorded in a type 1 leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRecord {
    /// Element offset of the chunk origin, one entry per dataset dimension.
    pub offsets: Vec<u64>,
    /// Stored (possibly filtered) size in bytes.
    pub size: u32,
    /// Bit `i` set means filter `i` was skipped for this chunk.
    pub filter_mask: u32,
    /// File address of the chunk bytes.
    pub address: u64,
}

struct Node {
    level: u8,
    /// Raw key bytes, `entries + 1` of them.
    keys: Vec<usize>,
    children: Vec<u64>,
}

fn parse_node(
    data: &[u8],
    address: u64,
    expected_type: u8,
    key_size: usize,
    offset_size: u8,
) -> Result<Node, FormatError> {
    let offset = usize::try_from(address).map_err(|_| FormatError::InvalidAddress(address))?;
    if offset >= data.len() {
        return Err(FormatError::InvalidAddress(address));
    }
    let os = offset_size as usize;
    ensure_len(data, offset, 8 + 2 * os)?;
    if &data[offset..offset + 4] != b"TREE" {
        return Err(FormatError::InvalidBTreeSignature);
    }
    if data[offset + 4] != expected_type {
        return Err(FormatError::InvalidBTreeNodeType(data[offset + 4]));
    }
    let level = data[offset + 5];
    let entries = read_u16(data, offset + 6)? as usize;

    let mut pos = offset + 8 + 2 * os;
    ensure_len(data, pos, entries * (key_size + os) + key_size)?;
    let mut keys = Vec::with_capacity(entries + 1);
    let mut children = Vec::with_capacity(entries);
    for _ in 0..entries {
        keys.push(pos);
        pos += key_size;
        children.push(read_uint(data, pos, offset_size)?);
        pos += os;
    }
    keys.push(pos);
    Ok(Node {
        level,
        keys,
        children,
    })
}

/// Walk a node tree depth first, calling `leaf` for every leaf entry.
///
/// Child levels must decrease by exactly one per step, which also bounds
/// the walk on corrupted files that link a node to itself.
fn walk<F>(
    data: &[u8],
    root: u64,
    node_type: u8,
    key_size: usize,
    offset_size: u8,
    mut leaf: F,
) -> Result<(), FormatError>
where
    F: FnMut(usize, u64) -> Result<(), FormatError>,
{
    let mut stack = vec![(root, None::<u8>)];
    while let Some((address, expected_level)) = stack.pop() {
        let node = parse_node(data, address, node_type, key_size, offset_size)?;
        if let Some(level) = expected_level {
            if node.level != level {
                return Err(FormatError::InvalidBTreeNodeType(node_type));
            }
        }
        if node.level == 0 {
            for (i, &child) in node.children.iter().enumerate() {
                leaf(node.keys[i], child)?;
            }
        } else {
            for &child in node.children.iter().rev() {
                stack.push((child, Some(node.level - 1)));
            }
        }
    }
    Ok(())
}

/// Addresses of every symbol table node (`SNOD`) below a group B-tree root.
pub fn collect_group_nodes(
    data: &[u8],
    root: u64,
    offset_size: u8,
    length_size: u8,
) -> Result<Vec<u64>, FormatError> {
    let mut nodes = Vec::new();
    walk(
        data,
        root,
        NODE_TYPE_GROUP,
        length_size as usize,
        offset_size,
        |_, child| {
            nodes.push(child);
            Ok(())
        },
    )?;
    Ok(nodes)
}

/// Every chunk recorded below a chunk B-tree root, in key order.
///
/// `rank` is the dataset rank; keys carry one extra trailing offset that is
/// always zero.
pub fn collect_chunks(
    data: &[u8],
    root: u64,
    offset_size: u8,
    rank: usize,
) -> Result<Vec<ChunkRecord>, FormatError> {
    let key_size = 8 + 8 * (rank + 1);
    let mut chunks = Vec::new();
    walk(
        data,
        root,
        NODE_TYPE_CHUNK,
        key_size,
        offset_size,
        |key, child| {
            let size = read_u32(data, key)?;
            let filter_mask = read_u32(data, key + 4)?;
            let mut offsets = Vec::with_capacity(rank);
            for d in 0..rank {
                offsets.push(read_uint(data, key + 8 + 8 * d, 8)?);
            }
            if is_undefined(child, offset_size) {
                return Err(FormatError::InvalidAddress(child));
            }
            chunks.push(ChunkRecord {
                offsets,
                size,
                filter_mask,
                address: child,
            });
            Ok(())
        },
    )?;
    Ok(chunks)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Serialize a node with 8-byte offsets; `keys` are raw key bytes.
    pub(crate) fn build_node(
        node_type: u8,
        level: u8,
        keys: &[Vec<u8>],
        children: &[u64],
    ) -> Vec<u8> {
        assert_eq!(keys.len(), children.len() + 1);
        let mut buf = b"TREE".to_vec();
        buf.push(node_type);
        buf.push(level);
        buf.extend_from_slice(&(children.len() as u16).to_le_bytes());
        buf.extend_from_slice(&u64::MAX.to_le_bytes());
        buf.extend_from_slice(&u64::MAX.to_le_bytes());
        for (key, child) in keys.iter().zip(children) {
            buf.extend_from_slice(key);
            buf.extend_from_slice(&child.to_le_bytes());
        }
        buf.extend_from_slice(&keys[keys.len() - 1]);
        buf
    }

    fn chunk_key(size: u32, offsets: &[u64]) -> Vec<u8> {
        let mut k = size.to_le_bytes().to_vec();
        k.extend_from_slice(&0u32.to_le_bytes());
        for o in offsets {
            k.extend_from_slice(&o.to_le_bytes());
        }
        k.extend_from_slice(&0u64.to_le_bytes());
        k
    }

    #[test]
    fn two_level_chunk_tree() {
        // leaves at 0x100 and 0x200, root at 0
        let root = build_node(
            1,
            1,
            &[chunk_key(0, &[0]), chunk_key(0, &[10]), chunk_key(0, &[20])],
            &[0x100, 0x200],
        );
        let leaf_a = build_node(1, 0, &[chunk_key(40, &[0]), chunk_key(0, &[10])], &[0x1000]);
        let leaf_b = build_node(1, 0, &[chunk_key(40, &[10]), chunk_key(0, &[20])], &[0x2000]);
        let mut file = vec![0u8; 0x300];
        file[..root.len()].copy_from_slice(&root);
        file[0x100..0x100 + leaf_a.len()].copy_from_slice(&leaf_a);
        file[0x200..0x200 + leaf_b.len()].copy_from_slice(&leaf_b);

        let chunks = collect_chunks(&file, 0, 8, 1).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].offsets, vec![0]);
        assert_eq!(chunks[0].address, 0x1000);
        assert_eq!(chunks[1].offsets, vec![10]);
        assert_eq!(chunks[1].size, 40);
    }

    #[test]
    fn self_referencing_node_is_rejected() {
        let key = 0u64.to_le_bytes().to_vec();
        let node = build_node(0, 1, &[key.clone(), key], &[0]);
        assert!(collect_group_nodes(&node, 0, 8, 8).is_err());
    }

    #[test]
    fn wrong_type_and_signature() {
        let key = 0u64.to_le_bytes().to_vec();
        let node = build_node(0, 0, &[key.clone(), key], &[0x40]);
        assert_eq!(
            collect_chunks(&node, 0, 8, 1),
            Err(FormatError::InvalidBTreeNodeType(0))
        );
        assert_eq!(
            collect_group_nodes(&[0u8; 64], 0, 8, 8),
            Err(FormatError::InvalidBTreeSignature)
        );
        assert_eq!(
            collect_group_nodes(&node, 4096, 8, 8),
            Err(FormatError::InvalidAddress(4096))
        );
    }
}
