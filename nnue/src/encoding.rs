use cozy_chess::{Board, Color, Piece, Square};

use crate::format::{Format, ACTIVATION_RANGE, WEIGHT_SCALE};
use crate::record::PositionRecord;

// Feature Layout (768 total), seen from one perspective:
//
//   [Own pieces: Pawn..King][Their pieces: Pawn..King]
//   └──── 6 x 64 squares ──┘└──── 6 x 64 squares ────┘
//
// index = square + 64 * (piece + 6 * color)
//
// "Own" is the perspective's color. Squares are rank-flipped for the black
// perspective so both sides see their own pieces moving up the board.

pub const NUM_FEATURES: usize = Color::NUM * Piece::NUM * Square::NUM;

/// Slots per perspective in a record. Enough for every piece on the board.
pub const MAX_ACTIVE_FEATURES: usize = 32;

/// Marks the end of a feature list inside a record.
pub const FEATURE_SENTINEL: u16 = u16::MAX;

/// Weight of the search score in the training target. The rest is the game result.
pub const SCORE_BLEND: f32 = 0.9;

/// Material on the board at the start of a game (P=1, N=B=3, R=5, Q=8).
pub const PHASE_MAX: usize = 76;

pub type FeatureVector = [f32; NUM_FEATURES];

pub fn feature_index(color: Color, piece: Piece, sq: Square) -> usize {
    sq as usize + Square::NUM * (piece as usize + Piece::NUM * color as usize)
}

/// Active feature indices of a board seen from `perspective`.
/// This is the list a dataset record stores for that side.
pub fn perspective_features(board: &Board, perspective: Color) -> Vec<u16> {
    let flip = perspective == Color::Black;

    board
        .occupied()
        .into_iter()
        .filter_map(|sq| {
            let color = board.color_on(sq)?;
            let piece = board.piece_on(sq)?;
            let (color, sq) = match flip {
                false => (color, sq),
                true => (!color, sq.flip_rank()),
            };
            Some(feature_index(color, piece, sq) as u16)
        })
        .collect()
}

/// Expands a sparse index list into a dense vector.
/// Callers pass lists already checked to be in range.
pub fn encode_features(indices: &[u16]) -> FeatureVector {
    let mut features = [0f32; NUM_FEATURES];
    for &idx in indices {
        features[idx as usize] = 1.0;
    }
    features
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Maps a search score into win probability space.
pub fn score_to_wdl(score_cp: i16) -> f32 {
    sigmoid(score_cp as f32 / ACTIVATION_RANGE / WEIGHT_SCALE * 8.0)
}

/// Training target: the search score blended with the game result.
/// Records without a score train on the result alone.
pub fn blended_target(score_cp: Option<i16>, outcome: u8) -> f32 {
    let result = outcome as f32 / 2.0;
    match score_cp {
        Some(score) => score_to_wdl(score) * SCORE_BLEND + result * (1.0 - SCORE_BLEND),
        None => result,
    }
}

pub fn phase_bucket(phase: u8, buckets: usize) -> usize {
    (phase as usize * buckets / PHASE_MAX).min(buckets - 1)
}

/// Material count used as the phase byte of bucketed records,
/// 76 for the starting position.
pub fn material_phase(board: &Board) -> u8 {
    let count = |piece| board.pieces(piece).len() as u8;

    count(Piece::Pawn)
        + 3 * count(Piece::Knight)
        + 3 * count(Piece::Bishop)
        + 5 * count(Piece::Rook)
        + 8 * count(Piece::Queen)
}

/// One encoded position, ready to be batched.
#[derive(Clone, Debug)]
pub struct TrainingSample {
    pub stm: FeatureVector,
    /// All zero for single-perspective formats.
    pub nstm: FeatureVector,
    pub bucket: usize,
    pub target: f32,
}

impl TrainingSample {
    pub fn from_record(record: &PositionRecord, format: Format) -> Self {
        let buckets = format.architecture().buckets;
        let bucket = match record.phase {
            Some(phase) if buckets > 1 => phase_bucket(phase, buckets),
            _ => 0,
        };

        Self {
            stm: encode_features(&record.side_indices),
            nstm: encode_features(&record.other_indices),
            bucket,
            target: blended_target(record.score_cp, record.outcome),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const TEST_POSITIONS: &[&str] = &[
        "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1", // Starting
        "r1bqkb1r/pppp1ppp/2n2n2/4p3/2B1P3/5N2/PPPP1PPP/RNBQK2R w KQkq - 4 4", // Italian
        "8/8/8/8/8/5k2/8/4K2R w - - 0 1",                           // Endgame
        "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1", // Kiwipete
    ];

    #[test]
    fn test_example_record_target() {
        let record = PositionRecord {
            side_indices: vec![10],
            other_indices: vec![],
            score_cp: Some(0),
            outcome: 2,
            phase: None,
        };
        let sample = TrainingSample::from_record(&record, Format::A);

        assert_eq!(sample.stm[10], 1.0);
        assert_eq!(sample.stm.iter().filter(|&&f| f != 0.0).count(), 1);
        assert!(sample.nstm.iter().all(|&f| f == 0.0));
        assert!((sample.target - 0.55).abs() < 1e-6);
        assert_eq!(sample.bucket, 0);
    }

    #[test]
    fn test_target_without_score_is_result() {
        assert_eq!(blended_target(None, 0), 0.0);
        assert_eq!(blended_target(None, 1), 0.5);
        assert_eq!(blended_target(None, 2), 1.0);
    }

    #[test]
    fn test_empty_list_encodes_to_zero_vector() {
        assert!(encode_features(&[]).iter().all(|&f| f == 0.0));
    }

    #[test]
    fn test_starting_position_phase_is_max() {
        let board = Board::default();
        assert_eq!(material_phase(&board) as usize, PHASE_MAX);
        assert_eq!(phase_bucket(material_phase(&board), 4), 3);
    }

    #[test]
    fn test_perspectives_mirror_each_other() {
        // The starting position is symmetric, so both sides see the same features.
        let board = Board::default();
        let mut white = perspective_features(&board, Color::White);
        let mut black = perspective_features(&board, Color::Black);
        white.sort_unstable();
        black.sort_unstable();

        assert_eq!(white.len(), 32);
        assert_eq!(white, black);
    }

    #[test]
    fn test_perspective_features_are_unique_and_in_range() {
        for fen in TEST_POSITIONS {
            let board: Board = fen.parse().unwrap();
            for color in Color::ALL {
                let mut features = perspective_features(&board, color);
                let count = features.len();
                features.sort_unstable();
                features.dedup();

                assert_eq!(features.len(), count, "duplicates for {}", fen);
                assert!(features.iter().all(|&f| (f as usize) < NUM_FEATURES));
            }
        }
    }

    #[test]
    fn test_own_king_feature() {
        let board = Board::default();
        let white = perspective_features(&board, Color::White);
        let black = perspective_features(&board, Color::Black);
        let own_king = feature_index(Color::White, Piece::King, Square::E1) as u16;

        assert!(white.contains(&own_king));
        assert!(black.contains(&own_king));
    }

    proptest! {
        #[test]
        fn prop_dense_vector_has_exactly_listed_bits(
            indices in proptest::collection::hash_set(0u16..NUM_FEATURES as u16, 0..=MAX_ACTIVE_FEATURES)
        ) {
            let indices: Vec<u16> = indices.into_iter().collect();
            let features = encode_features(&indices);

            for (i, &f) in features.iter().enumerate() {
                prop_assert_eq!(f == 1.0, indices.contains(&(i as u16)));
            }
        }

        #[test]
        fn prop_bucket_is_monotonic_and_bounded(phase in 0u8..u8::MAX, buckets in 1usize..8) {
            let here = phase_bucket(phase, buckets);
            let next = phase_bucket(phase + 1, buckets);

            prop_assert!(here <= next);
            prop_assert!(next < buckets);
        }

        #[test]
        fn prop_target_stays_in_unit_interval(score in any::<i16>(), outcome in 0u8..=2) {
            let target = blended_target(Some(score), outcome);
            prop_assert!((0.0..=1.0).contains(&target));
        }
    }
}
