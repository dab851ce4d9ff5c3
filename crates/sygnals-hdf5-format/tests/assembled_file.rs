//! Assemble complete files from the serializers and read them back with the
//! parsers, the same way the adapter's writer and reader use this crate.

use sygnals_hdf5_format::chunk_index::{locate_chunks, ChunkGeometry};
use sygnals_hdf5_format::data_layout::{ChunkIndex, DataLayout};
use sygnals_hdf5_format::dataspace::Dataspace;
use sygnals_hdf5_format::datatype::{ByteOrder, Datatype};
use sygnals_hdf5_format::file_writer::{serialize_objects, DatasetNode, ObjectNode};
use sygnals_hdf5_format::fill_value::FillValue;
use sygnals_hdf5_format::filter_pipeline::{
    FilterDescription, FilterPipeline, FILTER_FLETCHER32, FILTER_SHUFFLE,
};
use sygnals_hdf5_format::filters::{decode_chunk, encode_chunk};
use sygnals_hdf5_format::fixed_array::{self, FixedArrayEntry};
use sygnals_hdf5_format::link_message::{LinkMessage, LinkTarget};
use sygnals_hdf5_format::message_type::MessageType;
use sygnals_hdf5_format::object_header::ObjectHeader;
use sygnals_hdf5_format::signature::find_signature;
use sygnals_hdf5_format::superblock::{Superblock, SUPERBLOCK_V3_SIZE};

fn pad_to_8(buf: &mut Vec<u8>) {
    while buf.len() % 8 != 0 {
        buf.push(0);
    }
}

fn dataset_node(dims: &[u64], layout: DataLayout, pipeline: Option<FilterPipeline>) -> ObjectNode {
    ObjectNode::Dataset(DatasetNode {
        datatype: Datatype::integer(4, true, ByteOrder::LittleEndian),
        dataspace: Dataspace::simple(dims),
        fill_value: FillValue::default(),
        layout,
        pipeline,
        attributes: Vec::new(),
    })
}

/// Superblock, payload, then headers; returns the finished file bytes.
fn finish(mut file: Vec<u8>, nodes: &[ObjectNode]) -> Vec<u8> {
    pad_to_8(&mut file);
    let (meta, addrs) = serialize_objects(nodes, file.len() as u64).unwrap();
    file.extend_from_slice(&meta);
    let sb = Superblock::new_v3(addrs[0], file.len() as u64).serialize();
    file[..sb.len()].copy_from_slice(&sb);
    file
}

fn open_dataset(file: &[u8]) -> (Superblock, ObjectHeader) {
    let sig = find_signature(file).unwrap();
    let sb = Superblock::parse(file, sig, true).unwrap();
    let root = ObjectHeader::parse(file, sb.root_group_address as usize, 8, 8, true).unwrap();
    let link = LinkMessage::parse(&root.find(MessageType::Link).unwrap().data, 8).unwrap();
    let LinkTarget::Hard { address } = link.target else {
        panic!("expected a hard link");
    };
    let ds = ObjectHeader::parse(file, address as usize, 8, 8, true).unwrap();
    (sb, ds)
}

#[test]
fn contiguous_dataset_reads_back() {
    let values: Vec<i32> = (0..10).collect();
    let raw: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();

    let mut file = vec![0u8; SUPERBLOCK_V3_SIZE];
    let data_at = file.len() as u64;
    file.extend_from_slice(&raw);
    let nodes = [
        ObjectNode::Group {
            links: vec![("counts".into(), 1)],
            attributes: Vec::new(),
        },
        dataset_node(
            &[10],
            DataLayout::Contiguous {
                address: Some(data_at),
                size: raw.len() as u64,
            },
            None,
        ),
    ];
    let file = finish(file, &nodes);

    let (sb, ds) = open_dataset(&file);
    assert_eq!(sb.version, 3);
    assert_eq!(sb.eof_address, file.len() as u64);
    let layout = DataLayout::parse(&ds.find(MessageType::DataLayout).unwrap().data, 8, 8).unwrap();
    let DataLayout::Contiguous {
        address: Some(at),
        size,
    } = layout
    else {
        panic!("expected contiguous layout, got {layout:?}");
    };
    assert_eq!(&file[at as usize..(at + size) as usize], &raw[..]);
}

#[test]
fn filtered_fixed_array_dataset_reads_back() {
    // 10 elements in chunks of 4: the last chunk is ragged and padded.
    let dims = [10u64];
    let chunk_dims = [4u64];
    let pipeline = FilterPipeline::new(vec![
        FilterDescription::new(FILTER_SHUFFLE, vec![4]),
        FilterDescription::new(FILTER_FLETCHER32, Vec::new()),
    ]);

    let mut file = vec![0u8; SUPERBLOCK_V3_SIZE];
    let mut entries = Vec::new();
    for c in 0..3i32 {
        let mut chunk = vec![0u8; 16];
        for i in 0..4 {
            let v = c * 4 + i;
            if v < 10 {
                chunk[i as usize * 4..i as usize * 4 + 4].copy_from_slice(&v.to_le_bytes());
            }
        }
        let stored = encode_chunk(&chunk, &pipeline, 4).unwrap();
        entries.push(FixedArrayEntry {
            address: file.len() as u64,
            size: stored.len() as u64,
            filter_mask: 0,
        });
        file.extend_from_slice(&stored);
    }
    pad_to_8(&mut file);
    let index_at = file.len() as u64;
    let page_bits = fixed_array::page_bits_for(entries.len());
    file.extend_from_slice(&fixed_array::build(&entries, true, 16, page_bits, index_at));

    let layout = DataLayout::Chunked {
        chunk_dims: chunk_dims.to_vec(),
        element_size: 4,
        flags: 0,
        index: ChunkIndex::FixedArray {
            address: Some(index_at),
            page_bits,
        },
    };
    let nodes = [
        ObjectNode::Group {
            links: vec![("counts".into(), 1)],
            attributes: Vec::new(),
        },
        dataset_node(&dims, layout, Some(pipeline)),
    ];
    let file = finish(file, &nodes);

    let (_, ds) = open_dataset(&file);
    let layout = DataLayout::parse(&ds.find(MessageType::DataLayout).unwrap().data, 8, 8).unwrap();
    let pipeline =
        FilterPipeline::parse(&ds.find(MessageType::FilterPipeline).unwrap().data).unwrap();
    let DataLayout::Chunked {
        chunk_dims, index, ..
    } = layout
    else {
        panic!("expected chunked layout");
    };
    let geometry = ChunkGeometry {
        dims: &dims,
        grid_dims: &dims,
        chunk_dims: &chunk_dims,
        element_size: 4,
    };
    let chunks = locate_chunks(&file, &index, &geometry, 8, 8, true).unwrap();
    assert_eq!(chunks.len(), 3);

    let mut out = vec![0i32; 10];
    for chunk in &chunks {
        let stored = &file[chunk.address as usize..(chunk.address + chunk.size) as usize];
        let raw = decode_chunk(stored, &pipeline, chunk.filter_mask, 4).unwrap();
        let origin = chunk.origin[0] as usize;
        for (i, bytes) in raw.chunks_exact(4).enumerate() {
            if origin + i < out.len() {
                out[origin + i] = i32::from_le_bytes(bytes.try_into().unwrap());
            }
        }
    }
    assert_eq!(out, (0..10).collect::<Vec<i32>>());
}

#[test]
fn corrupt_superblock_checksum_is_detected() {
    let mut file = vec![0u8; SUPERBLOCK_V3_SIZE];
    let nodes = [ObjectNode::group()];
    file = finish(file, &nodes);
    file[20] ^= 0x01;
    assert!(Superblock::parse(&file, 0, true).is_err());
    assert!(Superblock::parse(&file, 0, false).is_ok());
}
