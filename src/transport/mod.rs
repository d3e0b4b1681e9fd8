//! Transport layer
//!
//! FIS layouts and codec, plus the mapping of an encoded FIS onto link-layer
//! stream units (one dword per unit, framed as one packet).

pub mod fis;

use std::sync::Arc;

use crate::error::FramingError;
use crate::stream::{Beat, EndpointDescriptor};
use crate::{Result, SataError};
pub use fis::{
    DataFis, DmaActivateD2h, Fis, FisField, FisFrame, FisLayout, FisRecord, FisType, PioSetupD2h,
    RegD2h, RegH2d, FIS_MAX_DWORDS,
};

/// Split an encoded FIS into link units carrying one dword each
pub fn fis_to_beats(dwords: &[u32], desc: &Arc<EndpointDescriptor>) -> Result<Vec<Beat>> {
    check_link_descriptor(desc)?;
    check_size(dwords.len())?;
    let n = dwords.len();
    dwords
        .iter()
        .enumerate()
        .map(|(i, dw)| -> Result<Beat> {
            Ok(desc
                .beat()
                .with("d", *dw as u64)?
                .with_markers(i == 0, i + 1 == n))
        })
        .collect()
}

/// Reassemble FIS dwords from one packet of link units
///
/// The units must form exactly one packet on a 32-bit link. Returns the
/// dwords and whether any unit flagged an error.
pub fn beats_to_fis(beats: &[Beat]) -> Result<(Vec<u32>, bool)> {
    check_size(beats.len())?;
    if beats.is_empty() {
        return Err(SataError::FisTruncated { got: 0, need: 1 });
    }
    let n = beats.len();
    let mut dwords = Vec::with_capacity(n);
    let mut error = false;
    for (i, beat) in beats.iter().enumerate() {
        check_link_descriptor(beat.descriptor())?;
        let fault = if beat.first != (i == 0) {
            Some(if i == 0 {
                FramingError::MissingStart
            } else {
                FramingError::StartWithoutEnd
            })
        } else if beat.last != (i + 1 == n) {
            // an early end leaves the following units outside any packet
            Some(if beat.last {
                FramingError::MissingStart
            } else {
                FramingError::MissingEnd
            })
        } else {
            None
        };
        if let Some(error) = fault {
            return Err(SataError::Framing {
                link: "fis".to_string(),
                error,
            });
        }
        dwords.push(beat.get("d")? as u32);
        error |= beat.descriptor().index_of("error").is_some() && beat.flag("error")?;
    }
    Ok((dwords, error))
}

fn check_size(dwords: usize) -> Result<()> {
    if dwords > FIS_MAX_DWORDS {
        return Err(SataError::FisTooLarge {
            dwords,
            max: FIS_MAX_DWORDS,
        });
    }
    Ok(())
}

fn check_link_descriptor(desc: &EndpointDescriptor) -> Result<()> {
    match desc.width_of("d") {
        Some(32) => Ok(()),
        Some(width) => Err(SataError::InvalidWidth(width)),
        None => Err(SataError::UnknownField("d".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::descriptors;

    #[test]
    fn test_fis_over_link() {
        let desc = descriptors::link(32).unwrap();
        let dwords = RegD2h {
            status: 0x50,
            ..Default::default()
        }
        .encode()
        .unwrap();

        let beats = fis_to_beats(&dwords, &desc).unwrap();
        assert_eq!(beats.len(), 5);
        assert!(beats[0].first && !beats[0].last);
        assert!(beats[4].last && !beats[4].first);

        let (back, error) = beats_to_fis(&beats).unwrap();
        assert!(!error);
        assert_eq!(back, dwords);
    }

    #[test]
    fn test_error_flag_propagates() {
        let desc = descriptors::link(32).unwrap();
        let mut beats = fis_to_beats(&[0x46, 1], &desc).unwrap();
        beats[1].set("error", 1).unwrap();
        let (_, error) = beats_to_fis(&beats).unwrap();
        assert!(error);
    }

    #[test]
    fn test_wide_link_rejected() {
        let desc = descriptors::link(64).unwrap();
        assert!(matches!(fis_to_beats(&[0x46], &desc), Err(SataError::InvalidWidth(64))));

        // a wide unit must not be truncated to its low dword
        let wide = desc
            .beat()
            .with("d", 0x1_0000_0046)
            .unwrap()
            .with_markers(true, true);
        assert!(matches!(beats_to_fis(&[wide]), Err(SataError::InvalidWidth(64))));
    }

    #[test]
    fn test_packet_markers_checked() {
        let desc = descriptors::link(32).unwrap();
        let beats = fis_to_beats(&[0x46, 1, 2], &desc).unwrap();

        let mut no_start = beats.clone();
        no_start[0].first = false;
        assert!(matches!(
            beats_to_fis(&no_start),
            Err(SataError::Framing { error: FramingError::MissingStart, .. })
        ));

        let mut reopened = beats.clone();
        reopened[1].first = true;
        assert!(matches!(
            beats_to_fis(&reopened),
            Err(SataError::Framing { error: FramingError::StartWithoutEnd, .. })
        ));

        let mut no_end = beats.clone();
        no_end[2].last = false;
        assert!(matches!(
            beats_to_fis(&no_end),
            Err(SataError::Framing { error: FramingError::MissingEnd, .. })
        ));

        let mut early_end = beats;
        early_end[1].last = true;
        assert!(beats_to_fis(&early_end).is_err());

        assert!(matches!(beats_to_fis(&[]), Err(SataError::FisTruncated { got: 0, .. })));
    }

    #[test]
    fn test_oversized_fis_rejected() {
        let desc = descriptors::link(32).unwrap();
        let dwords = vec![0x46; FIS_MAX_DWORDS + 1];
        assert!(matches!(
            fis_to_beats(&dwords, &desc),
            Err(SataError::FisTooLarge { dwords: 2049, max: 2048 })
        ));
        assert_eq!(fis_to_beats(&dwords[..FIS_MAX_DWORDS], &desc).unwrap().len(), FIS_MAX_DWORDS);
    }
}
