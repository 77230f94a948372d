//! MIDI Mapping Engine
//!
//! Translates already-decoded Control-Change messages into parameter store
//! updates. Only the mapping table lives here; transport discovery is the
//! caller's business.

use std::fmt;

use eq10_dsp::{BAND_COUNT, BAND_LABELS, MAX_GAIN_DB, MAX_MASTER_GAIN, MIN_GAIN_DB};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::params::ParameterStore;

/// CC value meaning "not assigned"
pub const UNASSIGNED_CC: i16 = -1;

/// Label used for the master gain mapping
pub const MASTER_LABEL: &str = "Master";

const CONTROL_CHANGE: u8 = 0xB0;
const MAX_CC_VALUE: f32 = 127.0;

/// What a mapping drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MappedParameter {
    Band(usize),
    MasterGain,
}

impl MappedParameter {
    /// Band labels first, then master gain
    pub fn all() -> impl Iterator<Item = MappedParameter> {
        (0..BAND_COUNT)
            .map(MappedParameter::Band)
            .chain(std::iter::once(MappedParameter::MasterGain))
    }

    pub fn label(self) -> &'static str {
        match self {
            MappedParameter::Band(i) => BAND_LABELS.get(i).copied().unwrap_or("?"),
            MappedParameter::MasterGain => MASTER_LABEL,
        }
    }

    pub fn from_label(label: &str) -> CoreResult<Self> {
        if label.eq_ignore_ascii_case(MASTER_LABEL) {
            return Ok(MappedParameter::MasterGain);
        }
        BAND_LABELS
            .iter()
            .position(|l| l.eq_ignore_ascii_case(label))
            .map(MappedParameter::Band)
            .ok_or_else(|| CoreError::UnknownParameter(label.to_string()))
    }
}

impl fmt::Display for MappedParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A decoded Control-Change message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlChange {
    pub channel: u8,
    pub cc: u8,
    pub value: u8,
}

/// Decode a raw MIDI triplet. Anything but Control-Change yields `None`.
pub fn decode(bytes: &[u8]) -> Option<ControlChange> {
    match bytes {
        [status, cc, value, ..] if status & 0xF0 == CONTROL_CHANGE => Some(ControlChange {
            channel: status & 0x0F,
            cc: cc & 0x7F,
            value: value & 0x7F,
        }),
        _ => None,
    }
}

/// CC value (0-127) to band gain in dB
pub fn cc_to_gain_db(value: u8) -> f32 {
    MIN_GAIN_DB + (value.min(127) as f32 / MAX_CC_VALUE) * (MAX_GAIN_DB - MIN_GAIN_DB)
}

/// CC value (0-127) to linear master gain
pub fn cc_to_master_gain(value: u8) -> f32 {
    (value.min(127) as f32 / MAX_CC_VALUE) * MAX_MASTER_GAIN
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidiMapping {
    pub id: Uuid,
    pub parameter: MappedParameter,
    pub cc: i16,
}

impl MidiMapping {
    pub fn is_assigned(&self) -> bool {
        self.cc != UNASSIGNED_CC
    }
}

/// One mapping per parameter, every CC held by at most one of them
#[derive(Debug, Clone)]
pub struct MidiMappingTable {
    mappings: Vec<MidiMapping>,
    learning: Option<MappedParameter>,
}

impl Default for MidiMappingTable {
    fn default() -> Self {
        Self::new()
    }
}

impl MidiMappingTable {
    /// All parameters present, none assigned
    pub fn new() -> Self {
        Self {
            mappings: MappedParameter::all()
                .map(|parameter| MidiMapping {
                    id: Uuid::new_v4(),
                    parameter,
                    cc: UNASSIGNED_CC,
                })
                .collect(),
            learning: None,
        }
    }

    pub fn mappings(&self) -> &[MidiMapping] {
        &self.mappings
    }

    pub fn cc_for(&self, parameter: MappedParameter) -> i16 {
        self.mapping(parameter).map_or(UNASSIGNED_CC, |m| m.cc)
    }

    fn mapping(&self, parameter: MappedParameter) -> Option<&MidiMapping> {
        self.mappings.iter().find(|m| m.parameter == parameter)
    }

    fn holder_of(&self, cc: i16) -> Option<MappedParameter> {
        if cc == UNASSIGNED_CC {
            return None;
        }
        self.mappings
            .iter()
            .find(|m| m.cc == cc)
            .map(|m| m.parameter)
    }

    fn check_cc(cc: i16) -> CoreResult<()> {
        if cc == UNASSIGNED_CC || (0..=127).contains(&cc) {
            Ok(())
        } else {
            Err(CoreError::InvalidCc(cc))
        }
    }

    /// Assign `cc` to `parameter`, rejecting a CC already held elsewhere.
    /// The sentinel is always accepted.
    pub fn assign(&mut self, parameter: MappedParameter, cc: i16) -> CoreResult<()> {
        Self::check_cc(cc)?;
        if let Some(holder) = self.holder_of(cc).filter(|&h| h != parameter) {
            return Err(CoreError::DuplicateCc {
                cc,
                holder: holder.label().to_string(),
            });
        }
        self.set(parameter, cc)
    }

    /// Assign `cc`, unassigning whichever parameter held it before
    pub fn assign_with_override(&mut self, parameter: MappedParameter, cc: i16) -> CoreResult<()> {
        Self::check_cc(cc)?;
        if let Some(holder) = self.holder_of(cc).filter(|&h| h != parameter) {
            info!("CC {} moved from {} to {}", cc, holder, parameter);
            self.set(holder, UNASSIGNED_CC)?;
        }
        self.set(parameter, cc)
    }

    pub fn clear(&mut self, parameter: MappedParameter) -> CoreResult<()> {
        self.set(parameter, UNASSIGNED_CC)
    }

    fn set(&mut self, parameter: MappedParameter, cc: i16) -> CoreResult<()> {
        let mapping = self
            .mappings
            .iter_mut()
            .find(|m| m.parameter == parameter)
            .ok_or_else(|| CoreError::UnknownParameter(parameter.label().to_string()))?;
        mapping.cc = cc;
        Ok(())
    }

    /// Replace the table from stored (label, cc) pairs. Unknown labels and
    /// colliding CCs are skipped.
    pub fn restore(&mut self, records: impl IntoIterator<Item = (String, i16)>) {
        *self = Self::new();
        for (label, cc) in records {
            let Ok(parameter) = MappedParameter::from_label(&label) else {
                debug!("Skipping mapping for unknown parameter '{}'", label);
                continue;
            };
            if let Err(e) = self.assign(parameter, cc) {
                debug!("Skipping mapping {} -> {}: {}", label, cc, e);
            }
        }
    }

    // MIDI learn

    /// Arm `parameter`; the next Control-Change assigns its CC
    pub fn start_learning(&mut self, parameter: MappedParameter) {
        self.learning = Some(parameter);
    }

    pub fn cancel_learning(&mut self) {
        self.learning = None;
    }

    pub fn learning(&self) -> Option<MappedParameter> {
        self.learning
    }

    /// Apply a raw MIDI message.
    ///
    /// While learning, the CC is assigned to the armed parameter (same
    /// uniqueness rule as [`assign`](Self::assign)) and no value is written.
    /// Otherwise the mapped parameter, if any, is updated in `store`.
    /// Returns the parameter that changed.
    pub fn handle_message(
        &mut self,
        bytes: &[u8],
        store: &mut ParameterStore,
    ) -> CoreResult<Option<MappedParameter>> {
        let Some(msg) = decode(bytes) else {
            return Ok(None);
        };
        let cc = i16::from(msg.cc);

        if let Some(parameter) = self.learning {
            self.assign(parameter, cc)?;
            self.learning = None;
            info!("Learned CC {} for {}", cc, parameter);
            return Ok(Some(parameter));
        }

        let Some(parameter) = self.holder_of(cc) else {
            return Ok(None);
        };
        match parameter {
            MappedParameter::Band(i) => store.update_band(i, cc_to_gain_db(msg.value)),
            MappedParameter::MasterGain => store.set_master_gain(cc_to_master_gain(msg.value)),
        }
        Ok(Some(parameter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_control_change_only() {
        assert_eq!(
            decode(&[0xB3, 16, 64]),
            Some(ControlChange {
                channel: 3,
                cc: 16,
                value: 64
            })
        );
        // Note on
        assert_eq!(decode(&[0x90, 60, 100]), None);
        // Too short
        assert_eq!(decode(&[0xB0, 16]), None);
        assert_eq!(decode(&[]), None);
    }

    #[test]
    fn test_value_scaling() {
        assert_eq!(cc_to_gain_db(0), -40.0);
        assert_eq!(cc_to_gain_db(127), 40.0);
        assert!((cc_to_gain_db(64) - 0.3149).abs() < 1e-3);
        assert_eq!(cc_to_master_gain(0), 0.0);
        assert_eq!(cc_to_master_gain(127), 2.0);
    }

    #[test]
    fn test_labels_round_trip() {
        for parameter in MappedParameter::all() {
            assert_eq!(MappedParameter::from_label(parameter.label()).unwrap(), parameter);
        }
        assert!(MappedParameter::from_label("20K").is_err());
    }

    #[test]
    fn test_duplicate_cc_rejected() {
        let mut table = MidiMappingTable::new();
        table.assign(MappedParameter::Band(0), 16).unwrap();

        let result = table.assign(MappedParameter::Band(1), 16);
        assert!(matches!(result, Err(CoreError::DuplicateCc { cc: 16, .. })));
        assert_eq!(table.cc_for(MappedParameter::Band(1)), UNASSIGNED_CC);

        // Re-assigning to the current holder is fine
        assert!(table.assign(MappedParameter::Band(0), 16).is_ok());
    }

    #[test]
    fn test_sentinel_never_collides() {
        let mut table = MidiMappingTable::new();
        for parameter in MappedParameter::all() {
            assert!(table.assign(parameter, UNASSIGNED_CC).is_ok());
        }
    }

    #[test]
    fn test_out_of_range_cc() {
        let mut table = MidiMappingTable::new();
        assert!(matches!(
            table.assign(MappedParameter::MasterGain, 128),
            Err(CoreError::InvalidCc(128))
        ));
        assert!(table.assign(MappedParameter::MasterGain, -2).is_err());
    }

    #[test]
    fn test_override_moves_cc() {
        let mut table = MidiMappingTable::new();
        table.assign(MappedParameter::Band(0), 16).unwrap();
        table
            .assign_with_override(MappedParameter::MasterGain, 16)
            .unwrap();
        assert_eq!(table.cc_for(MappedParameter::Band(0)), UNASSIGNED_CC);
        assert_eq!(table.cc_for(MappedParameter::MasterGain), 16);
    }

    #[test]
    fn test_handle_message_updates_band() {
        let mut table = MidiMappingTable::new();
        let mut store = ParameterStore::new();
        store.set_band_bypass(5, true);
        table.assign(MappedParameter::Band(5), 20).unwrap();

        let changed = table.handle_message(&[0xB0, 20, 127], &mut store).unwrap();
        assert_eq!(changed, Some(MappedParameter::Band(5)));
        assert_eq!(store.bands()[5].gain_db, 40.0);
        assert!(!store.bands()[5].bypass);
    }

    #[test]
    fn test_handle_message_master_and_unmapped() {
        let mut table = MidiMappingTable::new();
        let mut store = ParameterStore::new();
        table.assign(MappedParameter::MasterGain, 7).unwrap();

        table.handle_message(&[0xB0, 7, 0], &mut store).unwrap();
        assert_eq!(store.master_gain(), 0.0);

        let before = store.snapshot();
        assert_eq!(table.handle_message(&[0xB0, 99, 64], &mut store).unwrap(), None);
        assert_eq!(table.handle_message(&[0x80, 7, 64], &mut store).unwrap(), None);
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn test_learn_assigns_next_cc() {
        let mut table = MidiMappingTable::new();
        let mut store = ParameterStore::new();
        table.start_learning(MappedParameter::Band(2));

        // Non-CC traffic doesn't disarm
        table.handle_message(&[0x90, 60, 100], &mut store).unwrap();
        assert_eq!(table.learning(), Some(MappedParameter::Band(2)));

        table.handle_message(&[0xB0, 21, 10], &mut store).unwrap();
        assert_eq!(table.cc_for(MappedParameter::Band(2)), 21);
        assert_eq!(table.learning(), None);
        // Learning doesn't write the value
        assert_eq!(store.bands()[2].gain_db, 0.0);
    }

    #[test]
    fn test_learn_respects_uniqueness() {
        let mut table = MidiMappingTable::new();
        let mut store = ParameterStore::new();
        table.assign(MappedParameter::Band(0), 21).unwrap();
        table.start_learning(MappedParameter::Band(1));

        assert!(table.handle_message(&[0xB0, 21, 10], &mut store).is_err());
        assert_eq!(table.cc_for(MappedParameter::Band(1)), UNASSIGNED_CC);
        assert_eq!(table.learning(), Some(MappedParameter::Band(1)));
    }

    #[test]
    fn test_restore_skips_bad_records() {
        let mut table = MidiMappingTable::new();
        table.restore(vec![
            ("32".to_string(), 10),
            ("64".to_string(), 10),
            ("Nope".to_string(), 11),
            ("Master".to_string(), 12),
        ]);
        assert_eq!(table.cc_for(MappedParameter::Band(0)), 10);
        assert_eq!(table.cc_for(MappedParameter::Band(1)), UNASSIGNED_CC);
        assert_eq!(table.cc_for(MappedParameter::MasterGain), 12);
    }
}
