// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
use crate::analysis::value::{ValueId, Values};

/// A write record within one memory arena: the value which performed
/// the write, the symbolic start offset and the symbolic length.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MemItem {
    pub value: ValueId,
    pub start: ValueId,
    pub length: ValueId,
}

/// A symbolic storage entry: the key written to and the writing value
/// (or, for phase-two seeds, the candidate value observed in phase
/// one).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StoItem {
    pub key: ValueId,
    pub value: ValueId,
}

/// One step of the current DFS path: the basic-block offset entered,
/// the branch condition when the block ends in a `JUMPI`, and which
/// side of a branch the block was entered through.
#[derive(Clone, Copy, Debug)]
pub struct PathItem {
    pub offset: usize,
    pub condition: Option<ValueId>,
    pub is_jumpi_true_branch: Option<bool>,
}

/// The abstract machine state of one live DFS branch.  Cloning the
/// state duplicates every id sequence while the symbolic values
/// themselves stay shared in the arena; this is exactly the
/// copy-before-true-branch / restore-before-false-branch discipline
/// the engine relies on.
#[derive(Clone)]
pub struct State {
    /// Operand stack, top at the end.
    pub stk: Vec<ValueId>,
    /// One arena of write records per free-memory-pointer frame.
    pub mem: Vec<Vec<MemItem>>,
    /// Storage writes along this path, append-only.
    pub sto: Vec<StoItem>,
    /// Basic blocks visited, with branch conditions.
    pub path: Vec<PathItem>,
    /// Every value produced along this path, in order.
    pub trace: Vec<ValueId>,
    /// The scratch / free-memory-pointer cells at 0x00, 0x20, 0x40
    /// (and 0x60 for the four-slot preamble).
    pub mem_head: Vec<Option<MemItem>>,
    /// Successive values observed stored at address 0x40.
    pub fmps: Vec<ValueId>,
    /// Unique ids of `fmps`, kept in lockstep for cheap membership
    /// tests.
    pub fmpids: Vec<u64>,
}

impl State {
    pub fn new(mem_head_len: usize) -> Self {
        State {
            stk: Vec::new(),
            mem: Vec::new(),
            sto: Vec::new(),
            path: Vec::new(),
            trace: Vec::new(),
            mem_head: vec![None; mem_head_len],
            fmps: Vec::new(),
            fmpids: Vec::new(),
        }
    }

    pub fn mem_head_len(&self) -> usize {
        self.mem_head.len()
    }
}

/// A canonical summary of an operand stack at a basic-block entry,
/// used to cut off revisits.  Two stacks are interchangeable for the
/// purposes of the search when their values agree pointwise on
/// (push-offset, taint set).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Image {
    stk: Vec<(Option<usize>, Vec<u16>)>,
}

impl Image {
    pub fn new(values: &Values, stk: &[ValueId]) -> Self {
        let stk = stk
            .iter()
            .map(|&id| {
                let v = values.get(id);
                // BTreeSet iteration is already sorted
                (v.push_offset, v.taint.iter().copied().collect())
            })
            .collect();
        Image { stk }
    }
}
