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

/// Functionality for the symbolic taint analysis itself: polynomials
/// over symbolic terms, the symbolic-value arena, the per-path
/// abstract state, the per-instruction tracker and the depth-first
/// engine which drives everything.
pub mod analysis;
/// Functionality related to raw EVM bytecode: opcode metadata,
/// disassembled instructions and the linear-sweep disassembler.
pub mod evm;
/// The JSON report record summarising an analysis.
pub mod report;
pub mod util;
