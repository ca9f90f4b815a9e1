// src/cards.rs
use log::debug;

use crate::error::SegmentError;
use crate::types::{Block, SegmentConfig, TrailerPolicy};

/// Lays a byte stream out over numbered card blocks.
///
/// Every block is `config.block_size` bytes; the last one is zero-padded
/// on the right. Indices start at `config.start_index` and strictly increase.
/// Fails only for an unusable trailer rule or when indices would run past
/// `usize::MAX`.
pub fn segment(data: &[u8], config: &SegmentConfig) -> Result<Vec<Block>, SegmentError> {
    config.validate()?;

    let block_size = config.block_size.get();
    let mut blocks: Vec<Block> = Vec::with_capacity(data.len().div_ceil(block_size));
    let mut next_block = Some(config.start_index);

    for chunk in data.chunks(block_size) {
        let index = claim_index(next_block, &blocks, config)?;

        // Pad with 0s
        let mut block = vec![0u8; block_size];
        block[..chunk.len()].copy_from_slice(chunk);
        blocks.push(Block { index, data: block });
        next_block = index.checked_add(1);
    }

    if config.policy == TrailerPolicy::PadToBoundary {
        let modulus = config.trailer_modulus.get();
        while blocks.len() % modulus != 0 {
            let index = claim_index(next_block, &blocks, config)?;
            blocks.push(Block {
                index,
                data: vec![0u8; block_size],
            });
            next_block = index.checked_add(1);
        }
    }

    debug!(
        "Segmented {} bytes into {} blocks ({:?})",
        data.len(),
        blocks.len(),
        config.policy
    );
    Ok(blocks)
}

// Next index to fill; under skip-and-continue a trailer moves it on by one.
// A validated config never has two trailers in a row.
fn claim_index(
    next_block: Option<usize>,
    blocks: &[Block],
    config: &SegmentConfig,
) -> Result<usize, SegmentError> {
    let last = blocks.last().map_or(config.start_index, |block| block.index);
    let mut index = next_block.ok_or(SegmentError::IndexOverflow { last })?;

    if config.policy == TrailerPolicy::SkipAndContinue && config.is_trailer(index) {
        index = index
            .checked_add(1)
            .ok_or(SegmentError::IndexOverflow { last: index })?;
    }
    Ok(index)
}

/// Reassembles the byte stream `segment` produced, undoing the trailer
/// policy. Blocks are taken in index order; those below the start index,
/// and trailer positions under skip-and-continue, are left out. Zero
/// padding is kept.
pub fn join_blocks(blocks: &[Block], config: &SegmentConfig) -> Vec<u8> {
    let mut ordered: Vec<&Block> = blocks
        .iter()
        .filter(|block| block.index >= config.start_index)
        .filter(|block| {
            config.policy != TrailerPolicy::SkipAndContinue || !config.is_trailer(block.index)
        })
        .collect();
    ordered.sort_by_key(|block| block.index);

    ordered
        .into_iter()
        .flat_map(|block| block.data.iter().copied())
        .collect()
}

/// Indices of the blocks able to carry payload on a card of `total_blocks`.
pub fn data_block_indices(config: &SegmentConfig, total_blocks: usize) -> Vec<usize> {
    (config.start_index..total_blocks)
        .filter(|&index| !config.is_trailer(index))
        .collect()
}
