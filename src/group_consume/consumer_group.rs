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

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex, RwLock};
use tracing::{debug, info, trace};

use crate::message::TopicPartition;
use crate::partition::{Partition, PartitionsWriteLock, NO_OFFSET};
use crate::{AppError, AppResult, SubscriptionConfig};

use super::assignor::divide_partitions;
use super::{
    AssignmentSnapshot, CommitStrategy, Consumer, ConsumerGroup, ConsumerKey, GroupMetadata,
    GroupState, MemberMetadata, OffsetStrategy, PartitionStrategy,
};

impl GroupMetadata {
    fn new() -> Self {
        Self {
            state: GroupState::Empty,
            partition_strategy: None,
            members: HashMap::new(),
            committed_offsets: HashMap::new(),
            next_join_sequence: 0,
        }
    }
}

impl ConsumerGroup {
    pub fn new(
        group_name: impl Into<String>,
        topic_name: impl Into<String>,
        mut partitions: Vec<Arc<Partition>>,
        subscription_config: SubscriptionConfig,
    ) -> Self {
        partitions.sort_by_key(|p| p.partition_id());
        Self {
            group_name: group_name.into(),
            topic_name: topic_name.into(),
            partitions,
            subscription_config,
            metadata: RwLock::new(GroupMetadata::new()),
            phase: Mutex::new(0),
            phase_changed: Condvar::new(),
        }
    }

    pub fn group_name(&self) -> &str {
        &self.group_name
    }

    pub fn topic_name(&self) -> &str {
        &self.topic_name
    }

    pub fn partitions(&self) -> &[Arc<Partition>] {
        &self.partitions
    }

    pub fn subscription_config(&self) -> &SubscriptionConfig {
        &self.subscription_config
    }

    pub fn state(&self) -> GroupState {
        self.metadata.read().state
    }

    pub fn members_count(&self) -> usize {
        self.metadata.read().members.len()
    }

    pub fn phase(&self) -> u64 {
        *self.phase.lock()
    }

    /// Records handed out per partition and poll, so every partition gets at least one slot.
    pub fn poll_size_per_partition(&self) -> usize {
        let partition_count = self.partitions.len().max(1);
        (self.subscription_config.poll_size / partition_count).max(1)
    }

    pub fn is_consuming(&self, consumer: &Arc<dyn Consumer>) -> bool {
        self.metadata
            .read()
            .members
            .contains_key(&ConsumerKey::of(consumer))
    }

    /// Partitions currently assigned to `consumer`, or `None` if it is not registered.
    pub fn assigned_partitions(&self, consumer: &Arc<dyn Consumer>) -> Option<Vec<TopicPartition>> {
        let metadata = self.metadata.read();
        let member = metadata.members.get(&ConsumerKey::of(consumer))?;
        Some(
            member
                .assigned_partition_ids()
                .into_iter()
                .map(|id| TopicPartition::new(self.topic_name.clone(), id))
                .collect(),
        )
    }

    pub fn committed_offset(&self, partition_id: i32) -> Option<i64> {
        self.metadata
            .read()
            .committed_offsets
            .get(&partition_id)
            .copied()
    }

    /// Registers `consumer` and, depending on its partition strategy, hands it partitions.
    ///
    /// Fails without touching the group if the strategies are not a supported
    /// combination, the consumer belongs elsewhere, or it is already registered.
    pub fn create_consumption(&self, consumer: Arc<dyn Consumer>) -> AppResult<()> {
        self.validate_consumer(consumer.as_ref())?;
        let key = ConsumerKey::of(&consumer);
        let partition_strategy = consumer.partition_strategy();

        let mut metadata = self.metadata.write();
        if metadata.members.contains_key(&key) {
            return Err(AppError::DuplicateConsumer(format!(
                "consumer is already registered in group {} of topic {}",
                self.group_name, self.topic_name
            )));
        }
        if let Some(current) = metadata.partition_strategy {
            if current != partition_strategy {
                return Err(AppError::IllegalStateError(format!(
                    "group {} uses {:?}, consumer asks for {:?}",
                    self.group_name, current, partition_strategy
                )));
            }
        }

        let member = MemberMetadata::new(consumer, metadata.next_join_sequence);
        info!(
            "member {} joined group {} of topic {}",
            member.member_id(),
            self.group_name,
            self.topic_name
        );
        metadata.next_join_sequence += 1;
        metadata.members.insert(key, member);
        metadata.partition_strategy = Some(partition_strategy);
        self.transition_to(&mut metadata, GroupState::Active);

        match partition_strategy {
            PartitionStrategy::DividePartitions => self.repartition(&mut metadata),
            PartitionStrategy::SharePartitions => {
                let all = self.partition_ids();
                self.apply_assignment_delta(&mut metadata, key, &all, &[]);
            }
            PartitionStrategy::Manual => {}
        }
        self.bump_phase();
        Ok(())
    }

    /// Unregisters `consumer`, handing its partitions to the remaining members.
    /// Does nothing if it was never registered.
    pub fn stop_consuming(&self, consumer: &Arc<dyn Consumer>) {
        let key = ConsumerKey::of(consumer);
        let mut metadata = self.metadata.write();
        let Some(member) = metadata.members.remove(&key) else {
            debug!(
                "stop consuming ignored, consumer is not in group {}",
                self.group_name
            );
            return;
        };
        member.notify_assignment(&self.topic_name, &[], &member.assigned_partition_ids());
        info!(
            "member {} left group {} of topic {}",
            member.member_id(),
            self.group_name,
            self.topic_name
        );

        if metadata.members.is_empty() {
            metadata.partition_strategy = None;
            self.transition_to(&mut metadata, GroupState::Empty);
        } else if metadata.partition_strategy == Some(PartitionStrategy::DividePartitions) {
            self.repartition(&mut metadata);
        }
        self.bump_phase();
    }

    /// Adds partitions to a manually assigned consumer.
    pub fn assign_partition(
        &self,
        consumer: &Arc<dyn Consumer>,
        partitions: &[TopicPartition],
    ) -> AppResult<()> {
        let mut metadata = self.metadata.write();
        let partition_ids = self.check_manual_request(&metadata, consumer, partitions)?;
        self.apply_assignment_delta(&mut metadata, ConsumerKey::of(consumer), &partition_ids, &[]);
        self.bump_phase();
        Ok(())
    }

    /// Removes partitions from a manually assigned consumer.
    pub fn un_assign_partition(
        &self,
        consumer: &Arc<dyn Consumer>,
        partitions: &[TopicPartition],
    ) -> AppResult<()> {
        let mut metadata = self.metadata.write();
        let partition_ids = self.check_manual_request(&metadata, consumer, partitions)?;
        self.apply_assignment_delta(&mut metadata, ConsumerKey::of(consumer), &[], &partition_ids);
        self.bump_phase();
        Ok(())
    }

    /// Overwrites the committed offset of every partition in `offsets`.
    ///
    /// Last writer wins, a smaller offset replaces a larger one.
    pub fn commit(&self, offsets: &HashMap<i32, i64>) {
        let mut metadata = self.metadata.write();
        Self::commit_locked(&mut metadata, offsets);
    }

    /// Wakes every waiting consumption loop without changing any assignment.
    pub fn wake_up(&self) {
        self.bump_phase();
    }

    /// Blocks until the phase differs from `observed_phase` or the poll timeout
    /// elapses. Returns the phase seen on return.
    pub fn wait_for_phase_change(&self, observed_phase: u64) -> u64 {
        let mut phase = self.phase.lock();
        if *phase == observed_phase {
            let timeout = self.subscription_config.poll_timeout();
            self.phase_changed
                .wait_while_for(&mut phase, |current| *current == observed_phase, timeout);
        }
        *phase
    }

    pub(crate) fn poll_assignment(&self, consumer: &Arc<dyn Consumer>) -> Option<AssignmentSnapshot> {
        // read the phase first, so any change made after this snapshot is noticed by the wait
        let phase = self.phase();
        let metadata = self.metadata.read();
        let member = metadata.members.get(&ConsumerKey::of(consumer))?;
        let partitions = member
            .positions()
            .filter_map(|(id, offset)| self.partition(id).map(|p| (p.clone(), offset)))
            .collect();
        Some(AssignmentSnapshot { phase, partitions })
    }

    /// Moves the consumer's read positions after a successfully handled batch,
    /// committing them unless the consumer opted out.
    pub(crate) fn record_progress(&self, consumer: &Arc<dyn Consumer>, progress: &HashMap<i32, i64>) {
        let mut metadata = self.metadata.write();
        if let Some(member) = metadata.members.get_mut(&ConsumerKey::of(consumer)) {
            progress
                .iter()
                .for_each(|(partition_id, offset)| member.advance(*partition_id, *offset));
        }
        if consumer.commit_strategy() == CommitStrategy::CommitAfterProcessing {
            Self::commit_locked(&mut metadata, progress);
        }
    }

    fn commit_locked(metadata: &mut GroupMetadata, offsets: &HashMap<i32, i64>) {
        for (partition_id, offset) in offsets {
            trace!("commit partition {} offset {}", partition_id, offset);
            metadata.committed_offsets.insert(*partition_id, *offset);
        }
    }

    fn validate_consumer(&self, consumer: &dyn Consumer) -> AppResult<()> {
        if consumer.group_name() != self.group_name || consumer.topic_name() != self.topic_name {
            return Err(AppError::IllegalStateError(format!(
                "consumer of group {} on topic {} cannot join group {} on topic {}",
                consumer.group_name(),
                consumer.topic_name(),
                self.group_name,
                self.topic_name
            )));
        }
        match (consumer.partition_strategy(), consumer.commit_strategy()) {
            (PartitionStrategy::DividePartitions, CommitStrategy::CommitAfterProcessing)
            | (PartitionStrategy::SharePartitions, CommitStrategy::NoCommit)
            | (PartitionStrategy::Manual, _) => Ok(()),
            (partition_strategy, commit_strategy) => Err(AppError::IllegalStateError(format!(
                "unsupported combination {:?} / {:?} / {:?}",
                partition_strategy,
                commit_strategy,
                consumer.offset_strategy()
            ))),
        }
    }

    fn check_manual_request(
        &self,
        metadata: &GroupMetadata,
        consumer: &Arc<dyn Consumer>,
        partitions: &[TopicPartition],
    ) -> AppResult<Vec<i32>> {
        if consumer.partition_strategy() != PartitionStrategy::Manual {
            return Err(AppError::IllegalStateError(format!(
                "consumer uses {:?}, partitions can only be assigned to manual consumers",
                consumer.partition_strategy()
            )));
        }
        if !metadata.members.contains_key(&ConsumerKey::of(consumer)) {
            return Err(AppError::IllegalStateError(format!(
                "consumer is not registered in group {}",
                self.group_name
            )));
        }
        partitions
            .iter()
            .map(|tp| {
                if tp.topic == self.topic_name && self.partition(tp.partition).is_some() {
                    Ok(tp.partition)
                } else {
                    Err(AppError::IllegalStateError(format!(
                        "partition {} does not belong to group {} of topic {}",
                        tp, self.group_name, self.topic_name
                    )))
                }
            })
            .collect()
    }

    /// Deterministically divides all partitions over the members in join order.
    fn repartition(&self, metadata: &mut GroupMetadata) {
        let mut order: Vec<(u64, ConsumerKey)> = metadata
            .members
            .iter()
            .map(|(key, member)| (member.join_sequence(), *key))
            .collect();
        order.sort_by_key(|(join_sequence, _)| *join_sequence);

        let division = divide_partitions(&self.partition_ids(), order.len());
        for ((_, key), target) in order.into_iter().zip(division) {
            let lost: Vec<i32> = metadata.members[&key]
                .assigned_partition_ids()
                .into_iter()
                .filter(|id| !target.contains(id))
                .collect();
            self.apply_assignment_delta(metadata, key, &target, &lost);
        }
        debug!(
            "repartitioned group {} of topic {} over {} members",
            self.group_name,
            self.topic_name,
            metadata.members.len()
        );
    }

    /// Applies the real difference between the member's assignment and
    /// `gained`/`lost`, seeds offsets of new partitions and tells the listener.
    fn apply_assignment_delta(
        &self,
        metadata: &mut GroupMetadata,
        key: ConsumerKey,
        gained: &[i32],
        lost: &[i32],
    ) {
        let GroupMetadata {
            members,
            committed_offsets,
            ..
        } = metadata;
        let Some(member) = members.get_mut(&key) else {
            return;
        };
        let gained: Vec<i32> = gained
            .iter()
            .copied()
            .filter(|id| !member.is_assigned(*id))
            .collect::<BTreeSet<i32>>()
            .into_iter()
            .collect();
        let lost = member.remove_partitions(lost);
        self.add_partitions_to_loop(committed_offsets, member, &gained);
        member.notify_assignment(&self.topic_name, &gained, &lost);
    }

    /// Seeds the read position of newly assigned partitions: the committed
    /// offset if there is one, otherwise the offset strategy's default.
    fn add_partitions_to_loop(
        &self,
        committed_offsets: &HashMap<i32, i64>,
        member: &mut MemberMetadata,
        partition_ids: &[i32],
    ) {
        if partition_ids.is_empty() {
            return;
        }
        let offset_strategy = member.consumer().offset_strategy();
        let lock = PartitionsWriteLock::new(
            partition_ids
                .iter()
                .filter_map(|id| self.partition(*id))
                .map(|p| p.as_ref()),
        );
        lock.write(|guard| {
            for id in partition_ids {
                let offset = match (committed_offsets.get(id), offset_strategy) {
                    (Some(committed), _) => *committed,
                    (None, OffsetStrategy::Earliest) => NO_OFFSET,
                    (None, OffsetStrategy::Latest) => guard
                        .latest_offset(&TopicPartition::new(self.topic_name.clone(), *id))
                        .unwrap_or(NO_OFFSET),
                };
                trace!(
                    "member {} starts partition {} after offset {}",
                    member.member_id(),
                    id,
                    offset
                );
                member.set_position(*id, offset);
            }
        });
    }

    fn transition_to(&self, metadata: &mut GroupMetadata, target: GroupState) {
        if metadata.state != target && GroupState::can_transition_to(metadata.state, target) {
            info!(
                "group {} of topic {} {:?} -> {:?}",
                self.group_name, self.topic_name, metadata.state, target
            );
            metadata.state = target;
        }
    }

    fn bump_phase(&self) {
        {
            let mut phase = self.phase.lock();
            *phase += 1;
        }
        self.phase_changed.notify_all();
    }

    fn partition(&self, partition_id: i32) -> Option<&Arc<Partition>> {
        self.partitions
            .binary_search_by_key(&partition_id, |p| p.partition_id())
            .ok()
            .map(|index| &self.partitions[index])
    }

    fn partition_ids(&self) -> Vec<i32> {
        self.partitions.iter().map(|p| p.partition_id()).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::thread;
    use std::time::{Duration, Instant};

    use rstest::rstest;

    use super::*;
    use crate::group_consume::{HandleError, PartitionAssignmentListener};
    use crate::message::{Record, RecordMetadata};

    const TOPIC: &str = "topic";
    const GROUP: &str = "group";

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Assigned(Vec<i32>),
        Unassigned(Vec<i32>),
    }

    #[derive(Default)]
    struct RecordingListener {
        events: parking_lot::Mutex<Vec<Event>>,
    }

    impl RecordingListener {
        fn take(&self) -> Vec<Event> {
            std::mem::take(&mut *self.events.lock())
        }
    }

    fn ids(partitions: &[TopicPartition]) -> Vec<i32> {
        assert!(partitions.iter().all(|tp| tp.topic == TOPIC));
        partitions.iter().map(|tp| tp.partition).collect()
    }

    impl PartitionAssignmentListener for RecordingListener {
        fn on_partitions_assigned(&self, partitions: &[TopicPartition]) {
            self.events.lock().push(Event::Assigned(ids(partitions)));
        }

        fn on_partitions_unassigned(&self, partitions: &[TopicPartition]) {
            self.events.lock().push(Event::Unassigned(ids(partitions)));
        }
    }

    struct TestConsumer {
        offset_strategy: OffsetStrategy,
        partition_strategy: PartitionStrategy,
        commit_strategy: CommitStrategy,
        listener: RecordingListener,
    }

    impl Consumer for TestConsumer {
        fn group_name(&self) -> &str {
            GROUP
        }
        fn topic_name(&self) -> &str {
            TOPIC
        }
        fn offset_strategy(&self) -> OffsetStrategy {
            self.offset_strategy
        }
        fn partition_strategy(&self) -> PartitionStrategy {
            self.partition_strategy
        }
        fn commit_strategy(&self) -> CommitStrategy {
            self.commit_strategy
        }
        fn partition_assignment_listener(&self) -> Option<&dyn PartitionAssignmentListener> {
            Some(&self.listener)
        }
        fn handle_records(&self, _records: &[RecordMetadata]) -> Result<(), HandleError> {
            Ok(())
        }
    }

    fn test_consumer(
        partition_strategy: PartitionStrategy,
        commit_strategy: CommitStrategy,
        offset_strategy: OffsetStrategy,
    ) -> (Arc<TestConsumer>, Arc<dyn Consumer>) {
        let consumer = Arc::new(TestConsumer {
            offset_strategy,
            partition_strategy,
            commit_strategy,
            listener: RecordingListener::default(),
        });
        let dyn_consumer: Arc<dyn Consumer> = consumer.clone();
        (consumer, dyn_consumer)
    }

    fn divide_consumer() -> (Arc<TestConsumer>, Arc<dyn Consumer>) {
        test_consumer(
            PartitionStrategy::DividePartitions,
            CommitStrategy::CommitAfterProcessing,
            OffsetStrategy::Latest,
        )
    }

    fn manual_consumer() -> (Arc<TestConsumer>, Arc<dyn Consumer>) {
        test_consumer(
            PartitionStrategy::Manual,
            CommitStrategy::NoCommit,
            OffsetStrategy::Earliest,
        )
    }

    fn group(partition_count: i32) -> ConsumerGroup {
        group_with_config(partition_count, SubscriptionConfig::default())
    }

    fn group_with_config(partition_count: i32, config: SubscriptionConfig) -> ConsumerGroup {
        let partitions = (0..partition_count)
            .map(|id| Arc::new(Partition::new(TOPIC, id, 10)))
            .collect();
        ConsumerGroup::new(GROUP, TOPIC, partitions, config)
    }

    fn assigned(group: &ConsumerGroup, consumer: &Arc<dyn Consumer>) -> Vec<i32> {
        ids(&group.assigned_partitions(consumer).unwrap())
    }

    #[test]
    fn divide_join_reports_only_deltas() {
        let group = group(5);
        let (first, first_dyn) = divide_consumer();
        group.create_consumption(first_dyn.clone()).unwrap();
        assert_eq!(first.listener.take(), vec![Event::Assigned(vec![0, 1, 2, 3, 4])]);
        assert_eq!(group.state(), GroupState::Active);

        let (second, second_dyn) = divide_consumer();
        group.create_consumption(second_dyn.clone()).unwrap();

        let kept = assigned(&group, &first_dyn);
        let taken = assigned(&group, &second_dyn);
        assert_eq!(kept.len() + taken.len(), 5);
        assert!(kept.len().abs_diff(taken.len()) <= 1);
        assert_eq!(first.listener.take(), vec![Event::Unassigned(taken.clone())]);
        assert_eq!(second.listener.take(), vec![Event::Assigned(taken)]);
    }

    #[rstest]
    #[case(1)]
    #[case(2)]
    #[case(3)]
    #[case(4)]
    #[case(7)]
    fn divide_keeps_fair_disjoint_cover(#[case] member_count: usize) {
        let group = group(7);
        let consumers: Vec<Arc<dyn Consumer>> =
            (0..member_count).map(|_| divide_consumer().1).collect();
        for consumer in &consumers {
            group.create_consumption(consumer.clone()).unwrap();
        }
        let assignments: Vec<Vec<i32>> = consumers.iter().map(|c| assigned(&group, c)).collect();
        let union: BTreeSet<i32> = assignments.iter().flatten().copied().collect();
        assert_eq!(union, (0..7).collect());
        assert_eq!(assignments.iter().map(Vec::len).sum::<usize>(), 7);
        let max = assignments.iter().map(Vec::len).max().unwrap();
        let min = assignments.iter().map(Vec::len).min().unwrap();
        assert!(max - min <= 1);
    }

    #[test]
    fn divide_leave_hands_over_every_partition() {
        let group = group(6);
        let consumers: Vec<(Arc<TestConsumer>, Arc<dyn Consumer>)> =
            (0..3).map(|_| divide_consumer()).collect();
        for (_, consumer) in &consumers {
            group.create_consumption(consumer.clone()).unwrap();
        }
        consumers.iter().for_each(|(c, _)| {
            c.listener.take();
        });

        let (leaver, leaver_dyn) = &consumers[1];
        let orphaned = assigned(&group, leaver_dyn);
        group.stop_consuming(leaver_dyn);
        assert!(!group.is_consuming(leaver_dyn));
        assert!(group.assigned_partitions(leaver_dyn).is_none());
        assert_eq!(leaver.listener.take(), vec![Event::Unassigned(orphaned.clone())]);

        let remaining: BTreeSet<i32> = [&consumers[0].1, &consumers[2].1]
            .iter()
            .flat_map(|c| assigned(&group, c))
            .collect();
        assert_eq!(remaining, (0..6).collect());
        assert_eq!(group.members_count(), 2);
    }

    #[test]
    fn more_members_than_partitions() {
        let group = group(2);
        let consumers: Vec<Arc<dyn Consumer>> = (0..3).map(|_| divide_consumer().1).collect();
        for consumer in &consumers {
            group.create_consumption(consumer.clone()).unwrap();
        }
        let sizes: Vec<usize> = consumers.iter().map(|c| assigned(&group, c).len()).collect();
        assert_eq!(sizes, vec![1, 1, 0]);
    }

    #[test]
    fn share_assigns_all_partitions_to_everyone() {
        let group = group(4);
        let (first, first_dyn) = test_consumer(
            PartitionStrategy::SharePartitions,
            CommitStrategy::NoCommit,
            OffsetStrategy::Latest,
        );
        let (second, second_dyn) = test_consumer(
            PartitionStrategy::SharePartitions,
            CommitStrategy::NoCommit,
            OffsetStrategy::Earliest,
        );
        group.create_consumption(first_dyn.clone()).unwrap();
        group.create_consumption(second_dyn.clone()).unwrap();

        assert_eq!(assigned(&group, &first_dyn), vec![0, 1, 2, 3]);
        assert_eq!(assigned(&group, &second_dyn), vec![0, 1, 2, 3]);
        // the first member is not disturbed by the second joining
        assert_eq!(first.listener.take(), vec![Event::Assigned(vec![0, 1, 2, 3])]);

        group.stop_consuming(&second_dyn);
        assert_eq!(
            second.listener.take(),
            vec![
                Event::Assigned(vec![0, 1, 2, 3]),
                Event::Unassigned(vec![0, 1, 2, 3])
            ]
        );
        assert!(first.listener.take().is_empty());
        assert_eq!(assigned(&group, &first_dyn), vec![0, 1, 2, 3]);
    }

    #[test]
    fn manual_assign_and_unassign_report_deltas() {
        let group = group(8);
        let (consumer, consumer_dyn) = manual_consumer();
        group.create_consumption(consumer_dyn.clone()).unwrap();
        assert!(assigned(&group, &consumer_dyn).is_empty());
        assert!(consumer.listener.take().is_empty());

        let requested: Vec<TopicPartition> =
            [5, 6, 7].iter().map(|id| TopicPartition::new(TOPIC, *id)).collect();
        let phase = group.phase();
        group.assign_partition(&consumer_dyn, &requested).unwrap();
        assert!(group.phase() > phase);
        assert_eq!(consumer.listener.take(), vec![Event::Assigned(vec![5, 6, 7])]);
        assert_eq!(assigned(&group, &consumer_dyn), vec![5, 6, 7]);

        // already assigned partitions are not reported again
        group
            .assign_partition(&consumer_dyn, &[TopicPartition::new(TOPIC, 6)])
            .unwrap();
        assert!(consumer.listener.take().is_empty());

        group.un_assign_partition(&consumer_dyn, &requested).unwrap();
        assert_eq!(consumer.listener.take(), vec![Event::Unassigned(vec![5, 6, 7])]);
        assert!(assigned(&group, &consumer_dyn).is_empty());
    }

    #[test]
    fn manual_requests_are_validated() {
        let group = group(3);
        let partition = [TopicPartition::new(TOPIC, 1)];

        let (_, divide) = divide_consumer();
        group.create_consumption(divide.clone()).unwrap();
        assert!(matches!(
            group.assign_partition(&divide, &partition),
            Err(AppError::IllegalStateError(_))
        ));
        group.stop_consuming(&divide);

        let (_, manual) = manual_consumer();
        assert!(matches!(
            group.assign_partition(&manual, &partition),
            Err(AppError::IllegalStateError(_))
        ));

        group.create_consumption(manual.clone()).unwrap();
        for unknown in [TopicPartition::new(TOPIC, 3), TopicPartition::new("other", 1)] {
            assert!(matches!(
                group.un_assign_partition(&manual, &[unknown]),
                Err(AppError::IllegalStateError(_))
            ));
        }
        assert!(assigned(&group, &manual).is_empty());
    }

    #[test]
    fn duplicate_registration_fails() {
        let group = group(2);
        let (_, consumer) = divide_consumer();
        group.create_consumption(consumer.clone()).unwrap();
        let phase = group.phase();
        assert!(matches!(
            group.create_consumption(consumer.clone()),
            Err(AppError::DuplicateConsumer(_))
        ));
        assert_eq!(group.phase(), phase);
        assert_eq!(group.members_count(), 1);
    }

    #[rstest]
    #[case(PartitionStrategy::DividePartitions, CommitStrategy::NoCommit)]
    #[case(PartitionStrategy::SharePartitions, CommitStrategy::CommitAfterProcessing)]
    fn unsupported_strategies_fail(
        #[case] partition_strategy: PartitionStrategy,
        #[case] commit_strategy: CommitStrategy,
    ) {
        let group = group(2);
        let (_, consumer) = test_consumer(partition_strategy, commit_strategy, OffsetStrategy::Latest);
        assert!(matches!(
            group.create_consumption(consumer.clone()),
            Err(AppError::IllegalStateError(_))
        ));
        assert!(!group.is_consuming(&consumer));
        assert_eq!(group.state(), GroupState::Empty);
    }

    #[test]
    fn mixed_partition_strategies_fail() {
        let group = group(2);
        group.create_consumption(divide_consumer().1).unwrap();
        assert!(matches!(
            group.create_consumption(manual_consumer().1),
            Err(AppError::IllegalStateError(_))
        ));
    }

    #[test]
    fn offsets_are_seeded_from_commit_or_strategy() {
        let group = group(2);
        for partition in group.partitions() {
            for i in 0..4 {
                partition.add_record(Record::new(TOPIC, i, i));
            }
        }

        let (_, latest) = divide_consumer();
        group.create_consumption(latest.clone()).unwrap();
        let snapshot = group.poll_assignment(&latest).unwrap();
        let offsets: Vec<i64> = snapshot.partitions.iter().map(|(_, o)| *o).collect();
        assert_eq!(offsets, vec![4, 4]);

        group.commit(&HashMap::from([(0, 2)]));
        group.stop_consuming(&latest);
        assert_eq!(group.state(), GroupState::Empty);

        let (_, earliest) = test_consumer(
            PartitionStrategy::DividePartitions,
            CommitStrategy::CommitAfterProcessing,
            OffsetStrategy::Earliest,
        );
        group.create_consumption(earliest.clone()).unwrap();
        let snapshot = group.poll_assignment(&earliest).unwrap();
        let offsets: Vec<(i32, i64)> = snapshot
            .partitions
            .iter()
            .map(|(p, o)| (p.partition_id(), *o))
            .collect();
        assert_eq!(offsets, vec![(0, 2), (1, NO_OFFSET)]);
    }

    #[test]
    fn commit_is_last_write_wins() {
        let group = group(2);
        assert_eq!(group.committed_offset(0), None);
        group.commit(&HashMap::from([(0, 10), (1, 3)]));
        group.commit(&HashMap::from([(0, 4)]));
        assert_eq!(group.committed_offset(0), Some(4));
        assert_eq!(group.committed_offset(1), Some(3));
    }

    #[test]
    fn progress_commits_only_for_committing_consumers() {
        let group = group(1);
        let (_, consumer) = manual_consumer();
        group.create_consumption(consumer.clone()).unwrap();
        group
            .assign_partition(&consumer, &[TopicPartition::new(TOPIC, 0)])
            .unwrap();
        group.record_progress(&consumer, &HashMap::from([(0, 7)]));
        assert_eq!(group.committed_offset(0), None);
        let snapshot = group.poll_assignment(&consumer).unwrap();
        assert_eq!(snapshot.partitions[0].1, 7);
    }

    #[test]
    fn wait_returns_at_once_when_phase_moved() {
        let group = group(1);
        let observed = group.phase();
        group.wake_up();
        let started = Instant::now();
        assert_eq!(group.wait_for_phase_change(observed), observed + 1);
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn wait_is_woken_by_another_thread() {
        let config = SubscriptionConfig {
            poll_timeout_ms: 10_000,
            ..Default::default()
        };
        let group = Arc::new(group_with_config(1, config));
        let observed = group.phase();
        let waker = {
            let group = group.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                group.wake_up();
            })
        };
        let started = Instant::now();
        assert!(group.wait_for_phase_change(observed) > observed);
        assert!(started.elapsed() < Duration::from_secs(5));
        waker.join().unwrap();
    }

    #[test]
    fn wait_times_out_without_change() {
        let config = SubscriptionConfig {
            poll_timeout_ms: 30,
            ..Default::default()
        };
        let group = group_with_config(1, config);
        let observed = group.phase();
        assert_eq!(group.wait_for_phase_change(observed), observed);
    }

    #[test]
    fn stop_unknown_consumer_is_noop() {
        let group = group(2);
        let (consumer, consumer_dyn) = divide_consumer();
        let phase = group.phase();
        group.stop_consuming(&consumer_dyn);
        assert_eq!(group.phase(), phase);
        assert!(consumer.listener.take().is_empty());
        assert_eq!(group.state(), GroupState::Empty);
    }

    #[rstest]
    #[case(100, 5, 20)]
    #[case(3, 5, 1)]
    #[case(7, 2, 3)]
    fn poll_size_is_split_across_partitions(
        #[case] poll_size: usize,
        #[case] partitions: i32,
        #[case] expected: usize,
    ) {
        let config = SubscriptionConfig {
            poll_size,
            ..Default::default()
        };
        assert_eq!(
            group_with_config(partitions, config).poll_size_per_partition(),
            expected
        );
    }
}
