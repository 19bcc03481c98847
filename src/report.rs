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
use std::io;

use serde::Serialize;
use serde_json::ser::PrettyFormatter;

use crate::analysis::Engine;

/// The summary record emitted for one analysed bytecode.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Report {
    /// Whether any finding list ended up non-empty.
    pub is_reported: bool,
    /// Phases executed (1 or 2).
    pub steps: u32,
    pub conditions: usize,
    pub call_values: usize,
    pub to_addresses: usize,
    pub todo_keys: usize,
}

impl Report {
    pub fn new(engine: &Engine, is_reported: bool) -> Self {
        Report {
            is_reported,
            steps: engine.step(),
            conditions: engine.conditions().len(),
            call_values: engine.call_values().len(),
            to_addresses: engine.to_addresses().len(),
            todo_keys: engine.todo_keys().len(),
        }
    }

    /// Serialize as JSON indented with four spaces.
    pub fn write_pretty<W: io::Write>(&self, writer: W) -> serde_json::Result<()> {
        let formatter = PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(writer, formatter);
        self.serialize(&mut serializer)
    }
}
