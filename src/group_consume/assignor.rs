// Copyright 2025 jonefeewang@gmail.com
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

/// Splits `partition_ids` into `member_count` contiguous chunks whose sizes differ by at most one.
///
/// Earlier members get the larger chunks; members beyond the partition count get nothing.
pub(crate) fn divide_partitions(partition_ids: &[i32], member_count: usize) -> Vec<Vec<i32>> {
    if member_count == 0 {
        return Vec::new();
    }
    let base = partition_ids.len() / member_count;
    let remainder = partition_ids.len() % member_count;

    let mut division = Vec::with_capacity(member_count);
    let mut start = 0;
    for index in 0..member_count {
        let size = base + usize::from(index < remainder);
        division.push(partition_ids[start..start + size].to_vec());
        start += size;
    }
    division
}
