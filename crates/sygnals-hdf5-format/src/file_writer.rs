//! Object header layout for the writer.
//!
//! Payload bytes (chunks, indexes, heaps) are placed by the caller before
//! metadata is laid out, so every layout message already carries final
//! addresses. What is left is the tree of group and dataset headers, whose
//! addresses depend on each other's sizes.

#[cfg(not(feature = "std"))]
use alloc::{string::String, vec, vec::Vec};

use crate::attribute::AttributeMessage;
use crate::bytes::pad8;
use crate::data_layout::DataLayout;
use crate::dataspace::Dataspace;
use crate::datatype::Datatype;
use crate::error::FormatError;
use crate::fill_value::FillValue;
use crate::filter_pipeline::FilterPipeline;
use crate::link_info::{serialize_default_group_info, LinkInfo};
use crate::link_message::LinkMessage;
use crate::message_type::MessageType;
use crate::object_header_writer::{ObjectHeaderWriter, MSG_FLAG_CONSTANT};

/// Length field width used by everything this crate writes.
const LENGTH_SIZE: u8 = 8;

/// Metadata of one dataset whose payload is already placed.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetNode {
    pub datatype: Datatype,
    pub dataspace: Dataspace,
    pub fill_value: FillValue,
    pub layout: DataLayout,
    pub pipeline: Option<FilterPipeline>,
    pub attributes: Vec<AttributeMessage>,
}

/// One object to lay out. Links refer to other nodes by index.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectNode {
    Group {
        links: Vec<(String, usize)>,
        attributes: Vec<AttributeMessage>,
    },
    Dataset(DatasetNode),
}

impl ObjectNode {
    /// An empty group.
    pub fn group() -> ObjectNode {
        ObjectNode::Group {
            links: Vec::new(),
            attributes: Vec::new(),
        }
    }

    fn serialize(&self, addresses: &[u64]) -> Result<Vec<u8>, FormatError> {
        let mut w = ObjectHeaderWriter::new();
        match self {
            ObjectNode::Group { links, attributes } => {
                w.add_message(MessageType::LinkInfo, LinkInfo::serialize_compact());
                w.add_message(MessageType::GroupInfo, serialize_default_group_info());
                for (name, target) in links {
                    let address = addresses
                        .get(*target)
                        .copied()
                        .ok_or(FormatError::UnknownObject(*target))?;
                    w.add_message(MessageType::Link, LinkMessage::hard(name, address).serialize());
                }
                for attr in attributes {
                    w.add_message(MessageType::Attribute, attr.serialize(LENGTH_SIZE)?);
                }
            }
            ObjectNode::Dataset(ds) => {
                w.add_message_with_flags(
                    MessageType::Datatype,
                    ds.datatype.serialize(),
                    MSG_FLAG_CONSTANT,
                );
                w.add_message(MessageType::Dataspace, ds.dataspace.serialize(LENGTH_SIZE));
                w.add_message_with_flags(
                    MessageType::FillValue,
                    ds.fill_value.serialize(),
                    MSG_FLAG_CONSTANT,
                );
                w.add_message(MessageType::DataLayout, ds.layout.serialize_v4()?);
                if let Some(pipeline) = &ds.pipeline {
                    w.add_message(MessageType::FilterPipeline, pipeline.serialize());
                }
                for attr in &ds.attributes {
                    w.add_message(MessageType::Attribute, attr.serialize(LENGTH_SIZE)?);
                }
            }
        }
        w.serialize()
    }
}

/// Lay out every node back to back from `base_address`, each on an 8-byte
/// boundary. Returns the bytes and the address of each node.
///
/// Links are written with 8-byte addresses, so header sizes do not depend
/// on where their targets land and two passes suffice.
pub fn serialize_objects(
    nodes: &[ObjectNode],
    base_address: u64,
) -> Result<(Vec<u8>, Vec<u64>), FormatError> {
    let placeholder = vec![0u64; nodes.len()];
    let mut addresses = Vec::with_capacity(nodes.len());
    let mut cursor = base_address;
    for node in nodes {
        addresses.push(cursor);
        cursor += pad8(node.serialize(&placeholder)?.len()) as u64;
    }

    let mut buf = Vec::with_capacity((cursor - base_address) as usize);
    for node in nodes {
        buf.extend_from_slice(&node.serialize(&addresses)?);
        buf.resize(pad8(buf.len()), 0);
    }
    Ok((buf, addresses))
}
