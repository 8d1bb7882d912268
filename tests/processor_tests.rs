//! Processor variants driven over synthetic files

use ndarray::{arr2, ArrayD, IxDyn};
use timelapse_tools::prelude::*;
use timelapse_tools::processors::intensity::MAX_HISTOGRAM_BINS;
use timelapse_tools::processors::normalize_to_u8;

#[test]
fn test_passthrough_is_identity() -> Result<()> {
    let file = SyntheticFile::<u16>::from_spec("T3Y2X3", |c| {
        (c.index(DimensionTag::Time) * 100 + c.index(DimensionTag::Y) * 10 + c.index(DimensionTag::X)) as u16
    })?;

    let mut outputs = Vec::new();
    run_with(&file, Passthrough, &RunOptions::default(), NullSink, |index, data| {
        outputs.push((index, data));
        Ok(())
    })?;

    assert_eq!(outputs.len(), 3);
    let (index, last) = &outputs[2];
    assert_eq!(*index, 2);
    assert_eq!(last, &arr2(&[[200u16, 201, 202], [210, 211, 212]]).into_dyn());
    Ok(())
}

#[test]
fn test_min_max_finder_starts_undefined() {
    let finder = MinMaxFinder::<u8>::new();
    assert_eq!(finder.min(), None);
    assert_eq!(finder.max(), None);
    assert_eq!(finder.range(), None);
}

#[test]
fn test_min_max_finder_skips_nan() {
    let mut finder = MinMaxFinder::<f32>::new();
    finder.update(&ArrayD::from_shape_vec(IxDyn(&[3]), vec![f32::NAN, 2.5, -1.0]).unwrap());
    finder.update(&ArrayD::from_shape_vec(IxDyn(&[2]), vec![7.0, f32::NAN]).unwrap());

    assert_eq!(finder.range(), Some((-1.0, 7.0)));
    assert_eq!(finder.steps(), 2);

    let mut only_nan = MinMaxFinder::<f32>::new();
    only_nan.update(&ArrayD::from_elem(IxDyn(&[2, 2]), f32::NAN));
    assert_eq!(only_nan.range(), None);
}

#[test]
fn test_intensity_distribution_slots_and_histogram() -> Result<()> {
    // Z planes of constant value t * 10 + z
    let file = SyntheticFile::<u8>::from_spec("T3@4Z2Y2X4", |c| {
        ((c.index(DimensionTag::Time) - 4) * 10 + c.index(DimensionTag::Depth)) as u8
    })?;
    let distribution = run(
        &file,
        IntensityDistribution::default(),
        &RunOptions::default(),
        NullSink,
    )?;

    assert_eq!(distribution.slots(), Some(3));
    assert_eq!(distribution.filled_indices(), vec![4, 5, 6]);
    assert_eq!(distribution.histogram_offset(), Some(0));

    let histogram = distribution.histogram().expect("allocated");
    assert_eq!(histogram.shape(), &[3, 256]);
    // Slot 1 holds t = 5: 8 pixels of 10 and 8 of 11
    assert_eq!(histogram[[1, 10]], 8);
    assert_eq!(histogram[[1, 11]], 8);
    assert_eq!(histogram.row(1).sum(), 16);

    let z = distribution.profile(DimensionTag::Depth).expect("Z profile");
    assert_eq!(z.shape(), &[2, 3]);
    assert_eq!(z[[0, 2]], 20.0);
    assert_eq!(z[[1, 2]], 21.0);

    let x = distribution.profile(DimensionTag::X).expect("X profile");
    assert_eq!(x.shape(), &[4, 3]);
    // Median over one 10-plane and one 11-plane
    assert_eq!(x[[3, 1]], 10.5);

    let y = distribution.profile(DimensionTag::Y).expect("Y profile");
    assert_eq!(y.shape(), &[2, 3]);
    Ok(())
}

#[test]
fn test_intensity_distribution_without_depth() -> Result<()> {
    let file = SyntheticFile::<u16>::from_spec("T2Y3X2", |c| c.index(DimensionTag::Y) as u16 * 1000)?;
    let distribution = run(
        &file,
        IntensityDistribution::new(DimensionTag::Time),
        &RunOptions::default(),
        NullSink,
    )?;

    assert!(distribution.profile(DimensionTag::Depth).is_none());
    let y = distribution.profile(DimensionTag::Y).expect("Y profile");
    assert_eq!(y.column(0).to_vec(), vec![0.0, 1000.0, 2000.0]);
    assert_eq!(distribution.histogram().expect("allocated").shape(), &[2, 65536]);
    Ok(())
}

#[test]
fn test_intensity_distribution_rejects_unsupported_types() {
    let float = SyntheticFile::<f32>::from_spec("T2Y2X2", |_| 0.5).expect("valid layout");
    let err = run(&float, IntensityDistribution::default(), &RunOptions::default(), NullSink)
        .unwrap_err();
    assert!(matches!(err, TimelapseError::InvalidArgument { .. }));

    // One bin per u32 value would exceed the cap
    assert!(MAX_HISTOGRAM_BINS < (u32::MAX as usize));
    let wide = SyntheticFile::<u32>::from_spec("T2Y2X2", |_| 1).expect("valid layout");
    let err = run(&wide, IntensityDistribution::default(), &RunOptions::default(), NullSink)
        .unwrap_err();
    assert!(matches!(err, TimelapseError::InvalidArgument { .. }));
}

#[test]
fn test_intensity_distribution_over_channels() -> Result<()> {
    let file = SyntheticFile::<u8>::from_spec("T2C3Y2X2", |c| c.index(DimensionTag::Channel) as u8)?;
    let options = RunOptions::new(DimensionTag::Channel).fix_index(DimensionTag::Time, 0);
    let distribution = run(&file, IntensityDistribution::new(DimensionTag::Channel), &options, NullSink)?;

    let histogram = distribution.histogram().expect("allocated");
    assert_eq!(histogram.shape(), &[3, 256]);
    for channel in 0..3 {
        assert_eq!(histogram[[channel, channel]], 4);
    }
    Ok(())
}

#[test]
fn test_percentile_normalize_scales_to_u8() -> Result<()> {
    // 0..=100 in one slice
    let data = ArrayD::from_shape_vec(IxDyn(&[101]), (0..=100u16).collect()).unwrap();
    let normalizer = PercentileNormalize::new(10.0, 90.0)?;

    assert_eq!(normalizer.bounds(&data), Some((10.0, 90.0)));
    let out = normalizer.normalize(&data);
    assert_eq!(out[[0]], 0);
    assert_eq!(out[[10]], 0);
    assert_eq!(out[[50]], 127);
    assert_eq!(out[[90]], 255);
    assert_eq!(out[[100]], 255);
    Ok(())
}

#[test]
fn test_percentile_normalize_defaults_and_driver() -> Result<()> {
    let normalizer = PercentileNormalize::default();
    assert_eq!(normalizer.low(), 50.0);
    assert_eq!(normalizer.high(), 99.8);

    let file = SyntheticFile::<u16>::from_spec("T2Y4X4", |c| {
        (c.index(DimensionTag::Y) * 4 + c.index(DimensionTag::X)) as u16 * 100
    })?;
    let mut slices = Vec::new();
    run_with(&file, normalizer, &RunOptions::default(), NullSink, |_, slice| {
        slices.push(slice);
        Ok(())
    })?;

    assert_eq!(slices.len(), 2);
    for slice in &slices {
        assert_eq!(slice.shape(), &[4, 4]);
        // Lower half clips to 0, the maximum saturates
        assert_eq!(slice[[0, 0]], 0);
        assert_eq!(slice[[1, 3]], 0);
        assert_eq!(slice[[3, 3]], 255);
    }
    Ok(())
}

#[test]
fn test_percentile_normalize_constant_slice() -> Result<()> {
    let data = ArrayD::from_elem(IxDyn(&[3, 3]), 42u8);
    let out = PercentileNormalize::default().normalize(&data);
    assert!(out.iter().all(|&v| v == 0));

    let err = PercentileNormalize::new(80.0, 20.0).unwrap_err();
    assert!(matches!(err, TimelapseError::InvalidArgument { .. }));
    Ok(())
}

#[test]
fn test_normalize_to_u8_degenerate_range() {
    let data = ArrayD::from_shape_vec(IxDyn(&[3]), vec![1u16, 5, 9]).unwrap();
    let out = normalize_to_u8(&data, 5.0, 5.0);
    assert_eq!(out.into_raw_vec(), vec![0, 0, 255]);
}

#[test]
fn test_range_normalize_from_min_max() -> Result<()> {
    let file = SyntheticFile::<u16>::from_spec("T3Y1X2", |c| {
        (c.index(DimensionTag::Time) * 100 + c.index(DimensionTag::X) * 50) as u16
    })?;
    let finder = run(&file, MinMaxFinder::new(), &RunOptions::default(), NullSink)?;
    assert_eq!(finder.range(), Some((0, 250)));

    let normalizer = RangeNormalize::from_min_max(&finder)?;
    assert_eq!((normalizer.min(), normalizer.max()), (0.0, 250.0));

    let mut last = None;
    run_with(&file, normalizer, &RunOptions::default(), NullSink, |_, slice| {
        last = Some(slice);
        Ok(())
    })?;
    let last = last.expect("three steps");
    assert_eq!(last.into_raw_vec(), vec![204, 255]);

    let err = RangeNormalize::from_min_max(&MinMaxFinder::<u16>::new()).unwrap_err();
    assert!(matches!(err, TimelapseError::InvalidArgument { .. }));
    assert!(RangeNormalize::new(3.0, 1.0).is_err());
    Ok(())
}

#[test]
fn test_intensity_histogram_keeps_top_values_apart() -> Result<()> {
    let file = SyntheticFile::<u8>::from_spec("T1Y1X3", |c| [253u8, 254, 255][c.index(DimensionTag::X)])?;
    let distribution = run(&file, IntensityDistribution::default(), &RunOptions::default(), NullSink)?;

    let histogram = distribution.histogram().expect("allocated");
    assert_eq!(histogram.shape(), &[1, 256]);
    assert_eq!(histogram[[0, 253]], 1);
    assert_eq!(histogram[[0, 254]], 1);
    assert_eq!(histogram[[0, 255]], 1);
    Ok(())
}

#[test]
fn test_max_project_collapses_depth() -> Result<()> {
    let file = SyntheticFile::<u16>::from_spec("T2Z3Y2X2", |c| {
        let z = c.index(DimensionTag::Depth);
        // The brightest plane moves with time
        let peak = if z == c.index(DimensionTag::Time) { 1000 } else { 0 };
        (peak + z * 10 + c.index(DimensionTag::X)) as u16
    })?;

    let mut projections = Vec::new();
    run_with(&file, MaxProject::default(), &RunOptions::default(), NullSink, |index, plane| {
        projections.push((index, plane));
        Ok(())
    })?;

    assert_eq!(projections.len(), 2);
    let (index, first) = &projections[0];
    assert_eq!(*index, 0);
    assert_eq!(first, &arr2(&[[1000u16, 1001], [1000, 1001]]).into_dyn());
    assert_eq!(projections[1].1, arr2(&[[1010u16, 1011], [1010, 1011]]).into_dyn());
    Ok(())
}

#[test]
fn test_max_project_along_other_axes() -> Result<()> {
    let file = SyntheticFile::<u8>::from_spec("T1Y3X2", |c| {
        (c.index(DimensionTag::Y) * 2 + c.index(DimensionTag::X)) as u8
    })?;
    let mut rows = None;
    run_with(&file, MaxProject::new(DimensionTag::Y), &RunOptions::default(), NullSink, |_, plane| {
        rows = Some(plane);
        Ok(())
    })?;
    assert_eq!(rows.expect("one step").into_raw_vec(), vec![4, 5]);

    let data = ArrayD::from_shape_vec(IxDyn(&[2, 2]), vec![f32::NAN, 1.5, -3.0, f32::NAN]).unwrap();
    let dims = [(DimensionTag::Y, 2), (DimensionTag::X, 2)];
    let columns = MaxProject::new(DimensionTag::Y).project(&data, &dims)?;
    assert_eq!(columns.into_raw_vec(), vec![-3.0, 1.5]);
    Ok(())
}

#[test]
fn test_max_project_rejects_bad_steps() -> Result<()> {
    let flat = SyntheticFile::<u8>::from_spec("T2Y2X2", |_| 1)?;
    let err = run_with(&flat, MaxProject::default(), &RunOptions::default(), NullSink, |_, _| Ok(()))
        .unwrap_err();
    assert!(matches!(err, TimelapseError::InvalidDimension { .. }));

    let wide = SyntheticFile::<u8>::from_spec("T2C2Z2Y2X2", |_| 1)?;
    let err = run_with(&wide, MaxProject::default(), &RunOptions::default(), NullSink, |_, _| Ok(()))
        .unwrap_err();
    assert!(matches!(err, TimelapseError::InvalidArgument { .. }));

    let options = RunOptions::default().fix_index(DimensionTag::Channel, 1);
    let mut steps = 0;
    run_with(&wide, MaxProject::default(), &options, NullSink, |_, plane| {
        assert_eq!(plane.shape(), &[2, 2]);
        steps += 1;
        Ok(())
    })?;
    assert_eq!(steps, 2);
    Ok(())
}
