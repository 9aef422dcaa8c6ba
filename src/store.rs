use std::{fmt, sync::PoisonError};

use crate::{
    analyser::{self, Analyser, SharedAnalyser},
    output::OutputGraph,
    playback::{AudioAsset, SharedVoice, Voice},
    render::RenderError,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoopId(pub u64);

impl fmt::Display for LoopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "loop-{}", self.0)
    }
}

/// One recorded track. The voice and its analyser are created together here
/// and never swapped out.
pub struct Loop {
    id: LoopId,
    voice: SharedVoice,
    analyser: SharedAnalyser,
}

impl Loop {
    pub fn new(id: LoopId, asset: AudioAsset, fft_size: usize) -> Self {
        let voice = Voice::shared(asset);
        voice
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .set_looping(true);
        Self {
            id,
            voice,
            analyser: Analyser::shared(fft_size),
        }
    }

    pub fn id(&self) -> LoopId {
        self.id
    }

    pub fn is_playing(&self) -> bool {
        self.with_voice(|voice| voice.is_playing())
    }

    pub fn is_looping(&self) -> bool {
        self.with_voice(|voice| voice.is_looping())
    }

    pub fn position_secs(&self) -> f32 {
        self.with_voice(|voice| voice.position_secs())
    }

    pub fn duration_secs(&self) -> f32 {
        self.with_voice(|voice| voice.asset().duration_secs())
    }

    /// Current time-domain waveform of this loop's analyser.
    pub fn waveform(&self) -> Result<Vec<f32>, RenderError> {
        analyser::try_waveform(&self.analyser)
    }

    #[cfg(test)]
    pub(crate) fn analyser(&self) -> &SharedAnalyser {
        &self.analyser
    }

    fn restart(&self) {
        self.with_voice(|voice| {
            voice.seek_to_start();
            voice.play();
        });
    }

    fn halt(&self) {
        self.with_voice(|voice| {
            voice.pause();
            voice.seek_to_start();
        });
        self.analyser
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reset();
    }

    fn with_voice<R>(&self, f: impl FnOnce(&mut Voice) -> R) -> R {
        let mut guard = self.voice.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

impl fmt::Debug for Loop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loop").field("id", &self.id).finish()
    }
}

/// Ordered collection of loops, oldest first. Appending wires a loop into
/// the output graph; removing stops it and detaches it again.
pub struct LoopStore {
    loops: Vec<Loop>,
    graph: OutputGraph,
    next_id: u64,
}

impl LoopStore {
    pub fn new(graph: OutputGraph) -> Self {
        Self {
            loops: Vec::new(),
            graph,
            next_id: 1,
        }
    }

    pub fn next_id(&mut self) -> LoopId {
        let id = LoopId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn append(&mut self, new_loop: Loop) {
        self.graph.connect(
            new_loop.id,
            new_loop.voice.clone(),
            new_loop.analyser.clone(),
        );
        tracing::info!(id = %new_loop.id, seconds = new_loop.duration_secs(), "loop added");
        self.loops.push(new_loop);
    }

    /// Removes the most recently created loop. The returned loop is already
    /// stopped and detached.
    pub fn remove_last(&mut self) -> Option<Loop> {
        let Some(removed) = self.loops.pop() else {
            tracing::debug!("remove ignored: no loops");
            return None;
        };
        self.release(&removed);
        tracing::info!(id = %removed.id, remaining = self.loops.len(), "loop removed");
        Some(removed)
    }

    pub fn clear(&mut self) {
        for entry in &self.loops {
            self.release(entry);
        }
        let count = self.loops.len();
        self.loops.clear();
        tracing::info!(count, "all loops removed");
    }

    /// Rewinds every loop and starts it. Loops already playing restart.
    pub fn play_all(&self) {
        if self.loops.is_empty() {
            tracing::debug!("play ignored: no loops");
            return;
        }
        for entry in &self.loops {
            entry.restart();
        }
        tracing::info!(count = self.loops.len(), "playing all loops");
    }

    pub fn iter(&self) -> impl Iterator<Item = &Loop> {
        self.loops.iter()
    }

    pub fn len(&self) -> usize {
        self.loops.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }

    #[cfg(test)]
    pub fn last(&self) -> Option<&Loop> {
        self.loops.last()
    }

    fn release(&self, entry: &Loop) {
        entry.halt();
        self.graph.disconnect(entry.id);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::capture::AudioChunk;

    fn asset() -> AudioAsset {
        AudioAsset::from_chunks(
            vec![AudioChunk {
                samples: vec![0.5; 16],
            }],
            16,
        )
    }

    fn store_with(count: usize) -> (OutputGraph, LoopStore) {
        let graph = OutputGraph::new();
        let mut store = LoopStore::new(graph.clone());
        for _ in 0..count {
            let id = store.next_id();
            store.append(Loop::new(id, asset(), 8));
        }
        (graph, store)
    }

    #[test]
    fn append_wires_each_loop_into_the_graph() {
        let (graph, store) = store_with(3);
        assert_eq!(store.len(), 3);
        assert_eq!(graph.route_count(), 3);
        let ids: Vec<u64> = store.iter().map(|entry| entry.id().0).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn loops_never_share_a_voice() {
        let (_graph, store) = store_with(3);
        let loops: Vec<&Loop> = store.iter().collect();
        for (i, a) in loops.iter().enumerate() {
            for b in &loops[i + 1..] {
                assert!(!Arc::ptr_eq(&a.voice, &b.voice));
                assert!(!Arc::ptr_eq(&a.analyser, &b.analyser));
            }
        }
    }

    #[test]
    fn remove_last_takes_the_newest_and_detaches_it() {
        let (graph, mut store) = store_with(3);
        store.play_all();

        let removed = store.remove_last().expect("store had loops");
        assert_eq!(removed.id(), LoopId(3));
        assert!(!removed.is_playing());
        assert_eq!(store.len(), 2);
        assert_eq!(graph.route_count(), 2);
        assert_eq!(store.last().map(Loop::id), Some(LoopId(2)));
    }

    #[test]
    fn remove_last_on_empty_store_is_a_noop() {
        let (_graph, mut store) = store_with(0);
        assert!(store.remove_last().is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn clear_empties_any_store_and_detaches_everything() {
        for count in [0, 1, 5] {
            let (graph, mut store) = store_with(count);
            store.play_all();
            store.clear();
            assert_eq!(store.len(), 0);
            assert_eq!(graph.route_count(), 0);
        }
    }

    #[test]
    fn play_all_restarts_from_zero() {
        let (graph, store) = store_with(3);
        graph.set_sample_rate(16.0);
        store.play_all();
        let mut block = [0.0; 5];
        graph.render(&mut block);
        assert!(store.iter().all(|entry| entry.position_secs() > 0.0));

        store.play_all();
        for entry in store.iter() {
            assert!(entry.is_playing());
            assert!(entry.is_looping());
            assert_eq!(entry.position_secs(), 0.0);
        }
    }

    #[test]
    fn ids_keep_increasing_after_removal() {
        let (_graph, mut store) = store_with(2);
        store.remove_last();
        let id = store.next_id();
        assert_eq!(id, LoopId(3));
    }
}
