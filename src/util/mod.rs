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
use ruint::aliases::U256;

mod hex;

pub use hex::*;

/// Narrow a 256-bit word into a `usize`, or `None` if it does not
/// fit.  Jump targets, code offsets and scratch addresses all travel
/// through here.
pub fn to_usize(word: U256) -> Option<usize> {
    let limbs = word.as_limbs();
    if limbs[1] != 0 || limbs[2] != 0 || limbs[3] != 0 {
        return None;
    }
    usize::try_from(limbs[0]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_usize() {
        assert_eq!(to_usize(U256::from(0)), Some(0));
        assert_eq!(to_usize(U256::from(0x40)), Some(0x40));
        assert_eq!(to_usize(U256::from(u64::MAX)), Some(u64::MAX as usize));
        assert_eq!(to_usize(U256::from(1u128 << 64)), None);
        assert_eq!(to_usize(U256::MAX), None);
    }
}
