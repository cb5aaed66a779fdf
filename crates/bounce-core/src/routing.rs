//! Track-to-channel routing
//!
//! A [`RouteMap`] is a boolean matrix deciding which output channels each
//! input track contributes to. It is allocated for `max_channels` columns so
//! the active channel count can change without losing assignments that are
//! still in range.

/// Input-track by output-channel routing matrix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMap {
    /// Row per track, `max_channels` columns each
    map: Vec<Vec<bool>>,
    num_tracks: usize,
    num_channels: usize,
    max_channels: usize,
}

impl RouteMap {
    /// Create a diagonal map: track `i` feeds channel `i`
    ///
    /// The active channel count starts at `num_tracks`, clamped to
    /// `max_channels`.
    pub fn new(num_tracks: usize, max_channels: usize) -> Self {
        let num_channels = num_tracks.min(max_channels);
        let map = (0..num_tracks)
            .map(|i| (0..max_channels).map(|j| i == j && j < num_channels).collect())
            .collect();
        Self {
            map,
            num_tracks,
            num_channels,
            max_channels,
        }
    }

    /// Number of input tracks
    pub fn num_tracks(&self) -> usize {
        self.num_tracks
    }

    /// Active output channel count
    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    /// Column capacity
    pub fn max_channels(&self) -> usize {
        self.max_channels
    }

    /// Whether `track` contributes to `channel`
    pub fn is_routed(&self, track: usize, channel: usize) -> bool {
        self.map[track][channel]
    }

    /// Enable or disable one routing assignment
    pub fn set_routed(&mut self, track: usize, channel: usize, routed: bool) {
        assert!(channel < self.num_channels, "channel outside the active range");
        self.map[track][channel] = routed;
    }

    /// Change the active channel count, keeping assignments that overlap
    ///
    /// Columns leaving or entering the active range are cleared. Returns
    /// `false` without changes when `n` exceeds the column capacity.
    pub fn set_num_channels(&mut self, n: usize) -> bool {
        if n == self.num_channels {
            return true;
        }
        if n > self.max_channels {
            return false;
        }
        let (lo, hi) = if n < self.num_channels {
            (n, self.num_channels)
        } else {
            (self.num_channels, n)
        };
        for row in &mut self.map {
            for cell in &mut row[lo..hi] {
                *cell = false;
            }
        }
        self.num_channels = n;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_diagonal() {
        let map = RouteMap::new(2, 2);
        assert!(map.is_routed(0, 0));
        assert!(!map.is_routed(0, 1));
        assert!(!map.is_routed(1, 0));
        assert!(map.is_routed(1, 1));
    }

    #[test]
    fn test_channels_clamped_to_capacity() {
        let map = RouteMap::new(4, 2);
        assert_eq!(map.num_channels(), 2);
        assert!(!map.is_routed(2, 0));
        assert!(!map.is_routed(3, 1));
    }

    #[test]
    fn test_resize_preserves_overlap() {
        let mut map = RouteMap::new(2, 4);
        map.set_routed(0, 1, true);
        assert!(map.set_num_channels(4));
        assert!(map.is_routed(0, 0));
        assert!(map.is_routed(0, 1));
        assert!(!map.is_routed(0, 2));
        assert!(!map.is_routed(0, 3));
    }

    #[test]
    fn test_shrink_clears_retired_columns() {
        let mut map = RouteMap::new(2, 2);
        assert!(map.set_num_channels(1));
        assert!(map.set_num_channels(2));
        // track 1's old diagonal assignment was cleared on the way down
        assert!(!map.is_routed(1, 1));
    }

    #[test]
    fn test_resize_past_capacity_fails() {
        let mut map = RouteMap::new(2, 2);
        assert!(!map.set_num_channels(3));
        assert_eq!(map.num_channels(), 2);
    }

    #[test]
    fn test_clone_is_deep() {
        let mut map = RouteMap::new(1, 1);
        let copy = map.clone();
        map.set_routed(0, 0, false);
        assert!(copy.is_routed(0, 0));
    }
}
