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

/// Lifecycle of a consumer group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupState {
    /// No registered consumer. Committed offsets are kept for the next member.
    ///
    /// transition: a consumer registers => Active
    Empty,

    /// At least one registered consumer. Every join, leave, manual assign and
    /// manual unassign repartitions the group and advances its phase.
    ///
    /// transition: the last consumer stops => Empty
    Active,
}

impl GroupState {
    pub const fn can_transition_to(current: GroupState, target: GroupState) -> bool {
        matches!(
            (current, target),
            (GroupState::Empty, GroupState::Active) | (GroupState::Active, GroupState::Empty)
        )
    }
}
