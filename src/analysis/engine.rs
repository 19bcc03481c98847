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
use log::{debug, info, warn};
use ruint::aliases::U256;

use crate::analysis::state::{PathItem, StoItem};
use crate::analysis::tracker::{Error, Tracker};
use crate::analysis::value::{ValueId, Values};
use crate::evm::{opcode, Disassembly};
use crate::util::to_usize;

/// Maximum DFS depth before a branch is abandoned.
const MAX_DEPTH: u32 = 800;

/// A guarded call whose guard is influenced by a block-special
/// source.
#[derive(Clone, Copy, Debug)]
pub struct Condition {
    pub step: u32,
    pub condition: ValueId,
    pub call: ValueId,
}

/// A call whose transferred value or destination is influenced by a
/// block-special source.
#[derive(Clone, Copy, Debug)]
pub struct Finding {
    pub step: u32,
    pub call: ValueId,
}

/// The depth-first driver.  Phase one explores the contract with
/// empty storage; when it surfaces only tainted storage writes, phase
/// two re-explores with those writes seeded so that loads through the
/// same keys resolve to the tainted values.
pub struct Engine {
    bytecode: Vec<u8>,
    disasm: Disassembly,
    conditions: Vec<Condition>,
    call_values: Vec<Finding>,
    to_addresses: Vec<Finding>,
    todo_keys: Vec<StoItem>,
    step: u32,
}

impl Engine {
    pub fn new(bytecode: Vec<u8>) -> Self {
        let disasm = Disassembly::new(&bytecode);
        Engine {
            bytecode,
            disasm,
            conditions: Vec::new(),
            call_values: Vec::new(),
            to_addresses: Vec::new(),
            todo_keys: Vec::new(),
            step: 0,
        }
    }

    pub fn disassembly(&self) -> &Disassembly {
        &self.disasm
    }

    /// Phases executed (1 or 2).
    pub fn step(&self) -> u32 {
        self.step
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn call_values(&self) -> &[Finding] {
        &self.call_values
    }

    pub fn to_addresses(&self) -> &[Finding] {
        &self.to_addresses
    }

    pub fn todo_keys(&self) -> &[StoItem] {
        &self.todo_keys
    }

    /// Run the analysis.  Returns whether any finding was produced.
    pub fn run(&mut self) -> Result<bool, Error> {
        self.step = 1;
        // A contract can only be sensitive to block randomness if it
        // actually reads a special source (or derives one from a time
        // modulo), and only exploitable through an external call.
        let has_special = self.disasm.contains_any(opcode::is_special);
        let has_time = self.disasm.contains_any(opcode::is_time);
        let has_mod = self.disasm.contains_any(opcode::is_mod);
        if !has_special && (!has_time || !has_mod) {
            return Ok(false);
        }
        if !self.disasm.contains(opcode::CALL) {
            return Ok(false);
        }
        info!("== first step ==");
        let mut tracker = Tracker::new(&self.bytecode, 1, Values::new(), &[])?;
        self.dfs(&mut tracker, 0, 0, None);
        self.log_counts(true);
        if self.conditions.is_empty()
            && self.call_values.is_empty()
            && self.to_addresses.is_empty()
            && !self.todo_keys.is_empty()
        {
            info!("== second step ==");
            self.step = 2;
            let seeds = self.todo_keys.clone();
            let mut tracker = Tracker::new(&self.bytecode, 2, tracker.into_values(), &seeds)?;
            self.dfs(&mut tracker, 0, 0, None);
            self.log_counts(false);
        }
        Ok(!self.conditions.is_empty()
            || !self.call_values.is_empty()
            || !self.to_addresses.is_empty())
    }

    fn log_counts(&self, with_todo: bool) {
        info!("{} conditions", self.conditions.len());
        info!("{} to_addresses", self.to_addresses.len());
        info!("{} call_values", self.call_values.len());
        if with_todo {
            info!("{} todo_keys", self.todo_keys.len());
        }
    }

    /// Explore the basic block starting at `start_offset` and
    /// everything reachable from it, branching at `JUMPI` with a
    /// state copy for the taken side.
    fn dfs(
        &mut self,
        tracker: &mut Tracker,
        start_offset: usize,
        depth: u32,
        is_jumpi_true_branch: Option<bool>,
    ) {
        if depth > MAX_DEPTH {
            warn!("call stack too deep, start_offset={start_offset}, depth={depth}");
            return;
        }
        if !tracker.visit(start_offset) {
            debug!("image same, start_offset={start_offset:05x}");
            return;
        }
        tracker.state.path.push(PathItem {
            offset: start_offset,
            condition: None,
            is_jumpi_true_branch,
        });

        let mut pc = self
            .disasm
            .at_offset(start_offset)
            .expect("block start not instruction-aligned")
            .pc;
        loop {
            let inst = match self.disasm.at_pc(pc) {
                Some(inst) => *inst,
                None => break,
            };
            if opcode::info(inst.opcode).is_none() {
                warn!("Unknown opcode: {:#02x}", inst.opcode);
                break;
            }
            pc += 1;

            let id = match tracker.update(&self.bytecode, &self.disasm, &inst) {
                Some(id) => id,
                None => break,
            };
            self.taint_sink(tracker, id);

            if inst.opcode == opcode::JUMP {
                let target =
                    tracker.values.get(tracker.values.get(id).stack_operands[0]).value;
                match target.and_then(to_usize) {
                    Some(t) if self.disasm.is_invalid_jumpdest(t) => {}
                    Some(t) if self.disasm.is_jumpdest(t) => {
                        self.dfs(tracker, t, depth + 1, None);
                    }
                    Some(t) => warn!("Bad jumpdest: {:#02x}", t),
                    None => warn!("Bad jumpdest: unknown target"),
                }
                break;
            } else if inst.opcode == opcode::JUMPI {
                let ops = tracker.values.get(id).stack_operands.clone();
                let target = tracker.values.get(ops[0]).value;
                let condition = tracker.values.origin(ops[1]);
                tracker.state.path.last_mut().unwrap().condition = Some(condition);
                match target.and_then(to_usize) {
                    Some(t) if self.disasm.is_invalid_jumpdest(t) => {}
                    Some(t) if self.disasm.is_jumpdest(t) => {
                        let copy = tracker.state.clone();
                        self.dfs(tracker, t, depth + 1, Some(true));
                        tracker.state = copy;
                    }
                    Some(t) => warn!("Bad jumpdest: {:#02x}", t),
                    None => warn!("Bad jumpdest: unknown target"),
                }
                let next = self.disasm.at_pc(pc).expect("fallthrough past end of code");
                assert_eq!(next.offset, inst.offset + 1);
                let next_offset = next.offset;
                self.dfs(tracker, next_offset, depth + 1, Some(false));
                break;
            } else if inst.is_halt() {
                break;
            }

            // `pc` was already advanced, so this is the next
            // instruction: a JUMPDEST marks a basic-block boundary.
            if let Some(next) = self.disasm.at_pc(pc) {
                if next.opcode == opcode::JUMPDEST {
                    let next_offset = next.offset;
                    assert_eq!(next_offset, inst.offset + 1 + inst.push_arg().unwrap_or(0));
                    self.dfs(tracker, next_offset, depth + 1, None);
                    break;
                }
            }
        }
    }

    /// Inspect an executed instruction for the two sinks.  A `CALL`
    /// with sender-influenced destination and non-zero value reports
    /// special-tainted guards, values and destinations; in phase one
    /// an `SSTORE` under (or of) special taint becomes a seed
    /// candidate for phase two.
    fn taint_sink(&mut self, tracker: &mut Tracker, id: ValueId) {
        let inst = tracker.values.get(id).inst;
        if inst.opcode == opcode::CALL {
            let ops = tracker.values.get(id).stack_operands.clone();
            let kind = tracker.values.get(ops[1]).value;
            let precompile =
                matches!(kind.and_then(to_usize), Some(k) if (1..10).contains(&k));
            let call_value = tracker.values.get(ops[2]).value;
            if precompile || call_value == Some(U256::ZERO) {
                return;
            }
            let to_address = tracker.values.origin(ops[1]);
            let sender_influenced = tracker
                .values
                .get(to_address)
                .taint
                .iter()
                .any(|&t| opcode::is_caller(t));
            if sender_influenced {
                let conditions = path_conditions(tracker);
                for condition in conditions {
                    if tracker.values.uses_special(condition) {
                        self.conditions.push(Condition {
                            step: self.step,
                            condition,
                            call: id,
                        });
                    }
                }
                if tracker.values.uses_special(ops[2]) {
                    self.call_values.push(Finding { step: self.step, call: id });
                }
            }
            if tracker.values.uses_special(to_address) {
                self.to_addresses.push(Finding { step: self.step, call: id });
            }
        } else if self.step == 1 && inst.opcode == opcode::SSTORE {
            let key = tracker.values.origin(tracker.values.get(id).stack_operands[0]);
            let mut flag = tracker.values.uses_special(id);
            for condition in path_conditions(tracker) {
                if tracker.values.uses_special(condition) {
                    let taint = tracker.values.get(condition).taint.clone();
                    tracker.values.get_mut(id).taint.extend(taint);
                    flag = true;
                }
            }
            if flag {
                let key_poly = tracker.values.polynomial(key);
                let known = self.todo_keys.iter().rev().any(|item| {
                    let item_poly = tracker.values.polynomial(item.key);
                    item_poly.eq(&key_poly).unwrap_or(false)
                });
                if !known {
                    self.todo_keys.push(StoItem { key, value: id });
                }
            }
        }
    }
}

/// The guard conditions of every path item except the block currently
/// being executed.
fn path_conditions(tracker: &Tracker) -> Vec<ValueId> {
    let path = &tracker.state.path;
    path[..path.len() - 1].iter().filter_map(|item| item.condition).collect()
}
