//! Streaming driver validation, ordering and diagnostics

use ndarray::ArrayD;
use timelapse_tools::prelude::*;
use timelapse_tools::{plan_run, Diagnostic, DimensionSource};

/// Records every step it sees
#[derive(Debug, Default)]
struct Recorder {
    indices: Vec<usize>,
    shapes: Vec<Vec<usize>>,
    dims: Vec<String>,
    selectors: Vec<ReadSelectors>,
}

impl<T: Pixel> Processor<T> for Recorder {
    type Output = ();

    fn process(
        &mut self,
        data: ArrayD<T>,
        dims: &[(DimensionTag, usize)],
        _file: &dyn DimensionSource,
        selectors: &ReadSelectors,
    ) -> Result<Option<()>> {
        self.indices
            .push(selectors.get(DimensionTag::Time).unwrap_or(usize::MAX));
        self.shapes.push(data.shape().to_vec());
        self.dims.push(dims.iter().map(|(tag, _)| tag.as_char()).collect());
        self.selectors.push(selectors.clone());
        Ok(None)
    }
}

/// Plane at `t` holds `maxima[t]` in one pixel and `minima[t]` in another
fn extremes_file(minima: [u16; 3], maxima: [u16; 3]) -> SyntheticFile<u16> {
    SyntheticFile::from_spec("T3Y2X2", move |c| {
        let t = c.index(DimensionTag::Time);
        match (c.index(DimensionTag::Y), c.index(DimensionTag::X)) {
            (0, 0) => minima[t],
            (1, 1) => maxima[t],
            _ => (minima[t] + maxima[t]) / 2,
        }
    })
    .expect("valid layout")
}

#[test]
fn test_fixing_operating_dimension_conflicts() {
    let file = SyntheticFile::<u8>::from_spec("T5C2Y2X2", |_| 0).expect("valid layout");

    for k in [0, 3, 99] {
        let options = RunOptions::new(DimensionTag::Time).fix_index(DimensionTag::Time, k);
        let err = run(&file, Recorder::default(), &options, NullSink).unwrap_err();
        assert!(matches!(err, TimelapseError::ConflictingArguments { .. }));
    }

    let options = RunOptions::new(DimensionTag::Channel)
        .fix_range(DimensionTag::Channel, IndexRange::new(0, 1));
    let err = run(&file, Recorder::default(), &options, NullSink).unwrap_err();
    assert!(matches!(err, TimelapseError::ConflictingArguments { .. }));
    assert_eq!(file.read_count(), 0);
}

#[test]
fn test_steps_are_strictly_increasing_without_gaps() -> Result<()> {
    let file = SyntheticFile::<u8>::from_spec("T7Y2X2", |_| 1)?;
    let recorder = run(&file, Recorder::default(), &RunOptions::default(), NullSink)?;

    assert_eq!(recorder.indices, (0..7).collect::<Vec<_>>());
    assert_eq!(file.read_count(), 7);
    assert!(recorder.dims.iter().all(|d| d == "YX"));
    Ok(())
}

#[test]
fn test_operating_indices_are_absolute() -> Result<()> {
    let file = SyntheticFile::<u8>::from_spec("T4@10Y2X2", |_| 1)?;
    let recorder = run(&file, Recorder::default(), &RunOptions::default(), NullSink)?;
    assert_eq!(recorder.indices, vec![10, 11, 12, 13]);

    let options = RunOptions::default().with_range(IndexRange::new(11, 20).with_step(2));
    let recorder = run(&file, Recorder::default(), &options, NullSink)?;
    assert_eq!(recorder.indices, vec![11, 13]);
    Ok(())
}

#[test]
fn test_min_max_over_maxima_and_minima() -> Result<()> {
    let file = extremes_file([5, 1, 2], [5, 9, 2]);
    let finder = run(&file, MinMaxFinder::new(), &RunOptions::default(), NullSink)?;

    assert_eq!(finder.max(), Some(9));
    assert_eq!(finder.min(), Some(1));
    assert_eq!(finder.steps(), 3);
    Ok(())
}

#[test]
fn test_min_max_over_time_index_planes() -> Result<()> {
    let file = SyntheticFile::<u16>::from_spec("T5Y2X2", |c| c.index(DimensionTag::Time) as u16)?;
    let finder = run(&file, MinMaxFinder::new(), &RunOptions::new(DimensionTag::Time), NullSink)?;

    assert_eq!(finder.range(), Some((0, 4)));
    Ok(())
}

#[test]
fn test_unselected_dimensions_read_full_extent_with_diagnostic() -> Result<()> {
    let file = SyntheticFile::<u8>::from_spec("S1T3C2Z4Y2X2", |_| 0)?;
    let mut sink = CollectingSink::new();

    let options = RunOptions::default().fix_index(DimensionTag::Scene, 0);
    let recorder = run(&file, Recorder::default(), &options, &mut sink)?;

    assert_eq!(recorder.dims[0], "CZYX");
    assert_eq!(recorder.shapes[0], vec![2, 4, 2, 2]);
    assert_eq!(
        sink.diagnostics,
        vec![
            Diagnostic::FullExtentRead {
                dim: DimensionTag::Channel,
                len: 2,
                operating_dim: DimensionTag::Time,
            },
            Diagnostic::FullExtentRead {
                dim: DimensionTag::Depth,
                len: 4,
                operating_dim: DimensionTag::Time,
            },
        ]
    );
    Ok(())
}

#[test]
fn test_fully_fixed_run_emits_no_diagnostics() -> Result<()> {
    let file = SyntheticFile::<u8>::from_spec("B2@1T3C2Y2X2", |_| 0)?;
    let mut sink = CollectingSink::new();

    let options = RunOptions::default().fix_index(DimensionTag::Channel, 1);
    let recorder = run(&file, Recorder::default(), &options, &mut sink)?;

    assert!(sink.is_empty());
    for (step, selectors) in recorder.selectors.iter().enumerate() {
        assert_eq!(selectors.get(DimensionTag::Block), Some(1));
        assert_eq!(selectors.get(DimensionTag::Channel), Some(1));
        assert_eq!(selectors.get(DimensionTag::Time), Some(step));
    }
    Ok(())
}

#[test]
fn test_fixed_range_slices_after_read() -> Result<()> {
    let file = SyntheticFile::<u16>::from_spec("T2Z5@3Y2X2", |c| c.index(DimensionTag::Depth) as u16)?;
    let options = RunOptions::default().fix_range(DimensionTag::Depth, IndexRange::new(4, 8).with_step(2));

    let mut seen = Vec::new();
    run_with(&file, Passthrough, &options, NullSink, |index, data| {
        seen.push((index, data));
        Ok(())
    })?;

    assert_eq!(seen.len(), 2);
    for (_, data) in &seen {
        assert_eq!(data.shape(), &[2, 2, 2]);
        assert!(data.index_axis(ndarray::Axis(0), 0).iter().all(|&v| v == 4));
        assert!(data.index_axis(ndarray::Axis(0), 1).iter().all(|&v| v == 6));
    }
    Ok(())
}

#[test]
fn test_other_operating_dimension() -> Result<()> {
    let file = SyntheticFile::<u16>::from_spec("T2C3Y2X2", |c| c.index(DimensionTag::Channel) as u16)?;
    let options = RunOptions::new(DimensionTag::Channel).fix_index(DimensionTag::Time, 1);

    let mut maxima = Vec::new();
    run_with(&file, Passthrough, &options, NullSink, |index, data| {
        maxima.push((index, data.iter().copied().max().unwrap_or_default()));
        Ok(())
    })?;
    assert_eq!(maxima, vec![(0, 0), (1, 1), (2, 2)]);
    Ok(())
}

#[test]
fn test_invalid_dimensions_are_rejected_before_io() {
    let file = SyntheticFile::<u8>::from_spec("B2T3C2Y2X2", |_| 0).expect("valid layout");
    let invalid = |options: RunOptions| {
        let err = run(&file, Recorder::default(), &options, NullSink).unwrap_err();
        assert!(
            matches!(err, TimelapseError::InvalidDimension { .. }),
            "{options:?} gave {err}"
        );
    };

    // Operating dimension absent, spatial or block
    invalid(RunOptions::new(DimensionTag::Depth));
    invalid(RunOptions::new(DimensionTag::Y));
    invalid(RunOptions::new(DimensionTag::Block));
    // Fixed dimension absent, spatial, block or out of bounds
    invalid(RunOptions::default().fix_index(DimensionTag::Scene, 0));
    invalid(RunOptions::default().fix_index(DimensionTag::X, 0));
    invalid(RunOptions::default().fix_index(DimensionTag::Block, 0));
    invalid(RunOptions::default().fix_index(DimensionTag::Channel, 2));

    assert_eq!(file.read_count(), 0);
}

#[test]
fn test_malformed_ranges_are_invalid_arguments() {
    let file = SyntheticFile::<u8>::from_spec("T3C4Y2X2", |_| 0).expect("valid layout");

    let zero_step = RunOptions::default().with_range(IndexRange::full().with_step(0));
    let err = run(&file, Recorder::default(), &zero_step, NullSink).unwrap_err();
    assert!(matches!(err, TimelapseError::InvalidArgument { .. }));

    let bad_fixed =
        RunOptions::default().fix_range(DimensionTag::Channel, IndexRange::new(9, 12));
    let err = run(&file, Recorder::default(), &bad_fixed, NullSink).unwrap_err();
    assert!(matches!(err, TimelapseError::InvalidArgument { .. }));

    assert_eq!(file.read_count(), 0);
}

#[test]
fn test_conflict_reported_before_other_errors() {
    let file = SyntheticFile::<u8>::from_spec("C2Y2X2", |_| 0).expect("valid layout");
    // Time is absent too, but the conflict wins
    let options = RunOptions::new(DimensionTag::Time).fix_index(DimensionTag::Time, 0);
    let err = run(&file, Recorder::default(), &options, NullSink).unwrap_err();
    assert!(matches!(err, TimelapseError::ConflictingArguments { .. }));
}

#[test]
fn test_read_error_aborts_remaining_steps() {
    let file = SyntheticFile::<u8>::from_spec("T5Y2X2", |_| 0)
        .expect("valid layout")
        .failing_at(DimensionTag::Time, 2);

    let mut recorder = Recorder::default();
    let err = run(&file, &mut recorder, &RunOptions::default(), NullSink).unwrap_err();

    assert!(matches!(err, TimelapseError::CorruptSource { .. }));
    assert_eq!(recorder.indices, vec![0, 1]);
    assert_eq!(file.read_count(), 3);
}

#[test]
fn test_processor_error_aborts_remaining_steps() {
    struct FailAt(usize, usize);

    impl Processor<u8> for FailAt {
        type Output = ();

        fn process(
            &mut self,
            _data: ArrayD<u8>,
            _dims: &[(DimensionTag, usize)],
            _file: &dyn DimensionSource,
            _selectors: &ReadSelectors,
        ) -> Result<Option<()>> {
            self.1 += 1;
            if self.1 == self.0 {
                return Err(TimelapseError::CorruptSource {
                    message: "processor gave up".to_string(),
                });
            }
            Ok(None)
        }
    }

    let file = SyntheticFile::<u8>::from_spec("T5Y2X2", |_| 0).expect("valid layout");
    let mut processor = FailAt(2, 0);
    assert!(run(&file, &mut processor, &RunOptions::default(), NullSink).is_err());
    assert_eq!(processor.1, 2);
    assert_eq!(file.read_count(), 2);
}

#[test]
fn test_output_callback_error_aborts_run() {
    let file = SyntheticFile::<u8>::from_spec("T5Y2X2", |_| 0).expect("valid layout");
    let mut calls = 0;
    let result = run_with(&file, Passthrough, &RunOptions::default(), NullSink, |_, _| {
        calls += 1;
        Err(TimelapseError::InvalidArgument {
            message: "stop".to_string(),
        })
    });
    assert!(result.is_err());
    assert_eq!(calls, 1);
}

#[test]
fn test_plan_exposes_steps_and_selectors() -> Result<()> {
    let file = SyntheticFile::<u8>::from_spec("B1S2T4@2C3Y2X2", |_| 0)?;
    let options = RunOptions::default()
        .with_range(IndexRange::new(3, 6))
        .fix_index(DimensionTag::Scene, 1);
    let plan = plan_run(&file, &options)?;

    assert_eq!(plan.operating_dim(), DimensionTag::Time);
    assert_eq!(plan.steps(), &[3, 4, 5]);
    assert_eq!(plan.defaulted(), &[(DimensionTag::Channel, 3)]);

    let selectors = plan.selectors_for(4);
    assert_eq!(selectors.get(DimensionTag::Block), Some(0));
    assert_eq!(selectors.get(DimensionTag::Scene), Some(1));
    assert_eq!(selectors.get(DimensionTag::Time), Some(4));
    assert!(!selectors.contains(DimensionTag::Channel));
    assert_eq!(file.read_count(), 0);
    Ok(())
}

#[test]
fn test_empty_range_runs_no_steps() -> Result<()> {
    let file = SyntheticFile::<u8>::from_spec("T3Y2X2", |_| 0)?;
    let options = RunOptions::default().with_range(IndexRange::new(2, 1));
    let finder = run(&file, MinMaxFinder::new(), &options, NullSink)?;

    assert_eq!(finder.range(), None);
    assert_eq!(file.read_count(), 0);
    Ok(())
}

#[test]
fn test_parse_fixed_assignments() -> Result<()> {
    use timelapse_tools::driver::parse_fixed;

    assert_eq!(parse_fixed("C=1")?, (DimensionTag::Channel, Selector::Index(1)));
    assert_eq!(
        parse_fixed("z=2:6:2")?,
        (
            DimensionTag::Depth,
            Selector::Range(IndexRange::new(2, 6).with_step(2))
        )
    );
    assert!(matches!(
        parse_fixed("C1"),
        Err(TimelapseError::InvalidArgument { .. })
    ));
    assert!(matches!(
        parse_fixed("Q=1"),
        Err(TimelapseError::InvalidDimension { .. })
    ));
    assert!(matches!(
        parse_fixed("C=one"),
        Err(TimelapseError::InvalidArgument { .. })
    ));
    Ok(())
}
