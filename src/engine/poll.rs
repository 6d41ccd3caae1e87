// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-incubator project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Poll planning
//!
//! The pollable descriptors are turned into per-function read requests,
//! merged into the fewest contiguous bus reads, and the results of those
//! reads are split back per function afterwards.

use crate::protocol::{FunctionDescriptor, FunctionId, ProtocolTable};

/// Register range wanted by one function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadRequest {
    pub function: FunctionId,
    pub start_address: u16,
    pub register_count: u16,
}

impl ReadRequest {
    fn end(&self) -> u32 {
        u32::from(self.start_address) + u32::from(self.register_count)
    }
}

/// One bus read covering one or more requests.
///
/// `values` always holds `register_count` words: the device data once
/// filled, zeros otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadBlock {
    pub start_address: u16,
    pub register_count: u16,
    pub values: Vec<u16>,
    pub filled: bool,
}

impl ReadBlock {
    pub fn new(start_address: u16, register_count: u16) -> Self {
        Self {
            start_address,
            register_count,
            values: vec![0; usize::from(register_count)],
            filled: false,
        }
    }

    fn end(&self) -> u32 {
        u32::from(self.start_address) + u32::from(self.register_count)
    }

    /// Store a successful read. A length mismatch leaves the block unfilled.
    pub fn fill(&mut self, words: Vec<u16>) -> bool {
        if words.len() != usize::from(self.register_count) {
            return false;
        }
        self.values = words;
        self.filled = true;
        true
    }

    fn covers(&self, request: &ReadRequest) -> bool {
        self.start_address <= request.start_address && request.end() <= self.end()
    }
}

/// Per-function slice of a poll cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollResult {
    pub function: FunctionId,
    pub values: Vec<u16>,
    /// `false` when no successful block covered the request
    pub filled: bool,
}

fn requests_where(
    table: &ProtocolTable,
    wanted: impl Fn(&FunctionDescriptor) -> bool,
) -> Vec<ReadRequest> {
    let mut requests: Vec<ReadRequest> = table
        .descriptors()
        .iter()
        .filter(|d| wanted(d))
        .map(|d| ReadRequest {
            function: d.id,
            start_address: d.start_address,
            register_count: d.register_count,
        })
        .collect();
    requests.sort_by_key(|r| r.start_address);
    requests
}

/// Requests for every pollable descriptor, sorted by address
pub fn poll_requests(table: &ProtocolTable) -> Vec<ReadRequest> {
    requests_where(table, |d| d.can_poll)
}

/// Requests for readable registers left out of the periodic poll.
///
/// They only change on our own writes or behind our back while the link was
/// down, so the engine reads them on every new connection.
pub fn refresh_requests(table: &ProtocolTable) -> Vec<ReadRequest> {
    requests_where(table, |d| d.can_read && !d.can_poll)
}

/// Merge requests into contiguous blocks.
///
/// A request joins the previous block only when it starts exactly where that
/// block ends; gaps and overlaps start a new block.
pub fn merge_requests(requests: &[ReadRequest]) -> Vec<ReadBlock> {
    let mut sorted = requests.to_vec();
    sorted.sort_by_key(|r| r.start_address);

    let mut blocks: Vec<ReadBlock> = Vec::new();
    for request in sorted {
        match blocks.last_mut() {
            Some(last)
                if last.end() == u32::from(request.start_address)
                    && u32::from(last.register_count) + u32::from(request.register_count)
                        <= u32::from(u16::MAX) =>
            {
                last.register_count += request.register_count;
                last.values.resize(usize::from(last.register_count), 0);
            }
            _ => blocks.push(ReadBlock::new(request.start_address, request.register_count)),
        }
    }
    blocks
}

/// Split block data back per request. Requests without a filled covering
/// block get zeros and `filled = false`.
pub fn demux(requests: &[ReadRequest], blocks: &[ReadBlock]) -> Vec<PollResult> {
    requests
        .iter()
        .map(|request| {
            let source = blocks.iter().find(|b| b.filled && b.covers(request));
            match source {
                Some(block) => {
                    let offset = usize::from(request.start_address - block.start_address);
                    let len = usize::from(request.register_count);
                    PollResult {
                        function: request.function,
                        values: block.values[offset..offset + len].to_vec(),
                        filled: true,
                    }
                }
                None => PollResult {
                    function: request.function,
                    values: vec![0; usize::from(request.register_count)],
                    filled: false,
                },
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(function: FunctionId, start_address: u16, register_count: u16) -> ReadRequest {
        ReadRequest {
            function,
            start_address,
            register_count,
        }
    }

    fn spans(blocks: &[ReadBlock]) -> Vec<(u16, u16)> {
        blocks
            .iter()
            .map(|b| (b.start_address, b.register_count))
            .collect()
    }

    #[test]
    fn test_standard_poll_plan() {
        let requests = poll_requests(&ProtocolTable::standard());
        let blocks = merge_requests(&requests);
        // Current temp (1..3), limit switch 5, incub state 7 and motor steps 24
        assert_eq!(spans(&blocks), vec![(1, 2), (5, 1), (7, 1), (24, 1)]);
    }

    #[test]
    fn test_refresh_plan() {
        let requests = refresh_requests(&ProtocolTable::standard());
        let functions: Vec<FunctionId> = requests.iter().map(|r| r.function).collect();
        assert_eq!(
            functions,
            vec![
                FunctionId::TargetTemp,
                FunctionId::IncubFinishMask,
                FunctionId::MotorSpeed
            ]
        );
        // Target temp ends at 5, the finish mask sits at 6
        assert_eq!(spans(&merge_requests(&requests)), vec![(3, 2), (6, 1), (22, 1)]);
    }

    #[test]
    fn test_merge_contiguous_ranges() {
        let requests = [
            req(FunctionId::CurrentTemp, 1, 2),
            req(FunctionId::TargetTemp, 3, 2),
            req(FunctionId::LimitSwitch, 5, 1),
            req(FunctionId::IncubFinishMask, 6, 1),
            req(FunctionId::IncubState, 7, 1),
            req(FunctionId::MotorState, 23, 1),
        ];
        let blocks = merge_requests(&requests);
        assert_eq!(spans(&blocks), vec![(1, 7), (23, 1)]);
        assert!(blocks.iter().all(|b| b.values.len() == usize::from(b.register_count)));
    }

    #[test]
    fn test_merge_sorts_input() {
        let requests = [
            req(FunctionId::TargetTemp, 3, 2),
            req(FunctionId::CurrentTemp, 1, 2),
        ];
        assert_eq!(spans(&merge_requests(&requests)), vec![(1, 4)]);
    }

    #[test]
    fn test_merge_boundary_is_exact() {
        // Adjacent: 1 + 2 == 3
        let adjacent = [req(FunctionId::CurrentTemp, 1, 2), req(FunctionId::TargetTemp, 3, 2)];
        assert_eq!(merge_requests(&adjacent).len(), 1);

        // One register gap
        let gap = [req(FunctionId::CurrentTemp, 1, 2), req(FunctionId::LimitSwitch, 4, 1)];
        assert_eq!(spans(&merge_requests(&gap)), vec![(1, 2), (4, 1)]);

        // Overlap is not an exact continuation either
        let overlap = [req(FunctionId::CurrentTemp, 1, 2), req(FunctionId::LimitSwitch, 2, 1)];
        assert_eq!(spans(&merge_requests(&overlap)), vec![(1, 2), (2, 1)]);
    }

    #[test]
    fn test_demux_reproduces_slices() {
        let requests = [
            req(FunctionId::CurrentTemp, 1, 2),
            req(FunctionId::TargetTemp, 3, 2),
            req(FunctionId::LimitSwitch, 5, 1),
            req(FunctionId::IncubFinishMask, 6, 1),
            req(FunctionId::IncubState, 7, 1),
        ];
        let mut blocks = merge_requests(&requests);
        assert_eq!(spans(&blocks), vec![(1, 7)]);
        assert!(blocks[0].fill(vec![10, 11, 12, 13, 14, 15, 16]));

        let results = demux(&requests, &blocks);
        let slices: Vec<Vec<u16>> = results.iter().map(|r| r.values.clone()).collect();
        assert_eq!(
            slices,
            vec![vec![10, 11], vec![12, 13], vec![14], vec![15], vec![16]]
        );
        assert!(results.iter().all(|r| r.filled));
    }

    #[test]
    fn test_demux_zero_fills_failed_blocks() {
        let requests = [
            req(FunctionId::CurrentTemp, 1, 2),
            req(FunctionId::ReadMotorSteps, 24, 1),
        ];
        let mut blocks = merge_requests(&requests);
        assert!(blocks[1].fill(vec![400]));
        // Block 0 failed and stays zeroed
        assert!(!blocks[0].filled);
        assert_eq!(blocks[0].values, vec![0, 0]);

        let results = demux(&requests, &blocks);
        assert_eq!(results[0].values, vec![0, 0]);
        assert!(!results[0].filled);
        assert_eq!(results[1].values, vec![400]);
        assert!(results[1].filled);
    }

    #[test]
    fn test_fill_rejects_wrong_length() {
        let mut block = ReadBlock::new(1, 2);
        assert!(!block.fill(vec![1]));
        assert!(!block.filled);
        assert_eq!(block.values, vec![0, 0]);
    }
}
