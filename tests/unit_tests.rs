//! Unit tests for the supporting modules
//!
//! Errors, dimension parsing and description, index ranges, and the
//! parallel configuration.

use std::path::PathBuf;
use timelapse_tools::{
    describe,
    dimensions::describe_map,
    errors::{Result, TimelapseError},
    parallel::ParallelConfig,
    DimensionBounds, DimensionMap, DimensionTag, IndexRange, Selector, SyntheticFile,
};

#[test]
fn test_error_types() {
    let not_found = TimelapseError::NotFound {
        path: PathBuf::from("/data/missing.tls"),
    };
    assert_eq!(format!("{not_found}"), "File not found: /data/missing.tls");

    let directory = TimelapseError::IsADirectory {
        path: PathBuf::from("/data"),
    };
    assert!(format!("{directory}").contains("Please provide a single file"));

    let dim_err = TimelapseError::InvalidDimension {
        dim: "Z".to_string(),
        message: "not found in file".to_string(),
    };
    assert_eq!(format!("{dim_err}"), "Invalid dimension 'Z': not found in file");

    let io_err: TimelapseError = std::io::Error::other("disk gone").into();
    assert!(format!("{io_err}").contains("I/O error"));
}

#[test]
fn test_dimension_tag_parsing() -> Result<()> {
    assert_eq!("T".parse::<DimensionTag>()?, DimensionTag::Time);
    assert_eq!("z".parse::<DimensionTag>()?, DimensionTag::Depth);
    assert_eq!(DimensionTag::try_from('b')?, DimensionTag::Block);
    assert_eq!(DimensionTag::Channel.to_string(), "C");
    assert_eq!(DimensionTag::Depth.name(), "depth");

    assert!(matches!(
        "Q".parse::<DimensionTag>(),
        Err(TimelapseError::InvalidDimension { .. })
    ));
    assert!("TC".parse::<DimensionTag>().is_err());
    assert!("".parse::<DimensionTag>().is_err());
    Ok(())
}

#[test]
fn test_dimension_tag_classes() {
    for tag in DimensionTag::ALL {
        assert!(!(tag.is_spatial() && tag.is_operable()));
    }
    assert!(DimensionTag::Y.is_spatial());
    assert!(!DimensionTag::Block.is_operable());
    assert!(!DimensionTag::Block.is_spatial());
    assert_eq!(DimensionTag::OPERABLE.len(), 4);
}

#[test]
fn test_dimension_map_from_spec() -> Result<()> {
    let dims = DimensionMap::from_spec("B2@1S1T5@10Y4X3")?;
    assert_eq!(dims.len(), 5);
    assert_eq!(dims.get(DimensionTag::Block), Some(DimensionBounds::new(1, 2)));
    let time = dims.get(DimensionTag::Time).expect("time");
    assert_eq!((time.begin, time.len, time.end()), (10, 5, 15));
    assert!(time.contains(14));
    assert!(!time.contains(15));
    assert!(!time.contains(9));
    assert_eq!(
        dims.tags().collect::<Vec<_>>(),
        vec![
            DimensionTag::Block,
            DimensionTag::Scene,
            DimensionTag::Time,
            DimensionTag::Y,
            DimensionTag::X
        ]
    );

    assert!(DimensionMap::from_spec("T").is_err());
    assert!(DimensionMap::from_spec("T3@").is_err());
    assert!(matches!(
        DimensionMap::from_spec("T3W2"),
        Err(TimelapseError::InvalidDimension { .. })
    ));
    Ok(())
}

#[test]
fn test_dimension_map_insert_replaces() {
    let mut dims = DimensionMap::new().with(DimensionTag::Time, 0, 3);
    dims.insert(DimensionTag::Time, 2, 4);
    assert_eq!(dims.len(), 1);
    assert_eq!(dims.get(DimensionTag::Time), Some(DimensionBounds::new(2, 4)));
    assert_eq!(dims.remove(DimensionTag::Time), Some(DimensionBounds::new(2, 4)));
    assert!(dims.is_empty());
}

#[test]
fn test_describe_orders_spatial_last() -> Result<()> {
    let file = SyntheticFile::<u8>::from_spec("X4C2B1Y3T5", |_| 0)?;
    let descriptor = describe(&file)?;

    assert_eq!(descriptor.dims_string(), "CTYX");
    assert_eq!(descriptor.len(), 4);
    assert_eq!(descriptor.block(), Some(DimensionBounds::new(0, 1)));
    assert_eq!(
        descriptor.non_spatial().iter().map(|(t, _)| *t).collect::<Vec<_>>(),
        vec![DimensionTag::Channel, DimensionTag::Time]
    );
    assert_eq!(descriptor.spatial()[0].1.len, 3);
    assert!(!descriptor.contains(DimensionTag::Block));
    Ok(())
}

#[test]
fn test_describe_rejects_bad_layouts() -> Result<()> {
    assert!(matches!(
        describe_map(&DimensionMap::new()),
        Err(TimelapseError::CorruptSource { .. })
    ));
    assert!(matches!(
        describe_map(&DimensionMap::from_spec("T3Y0X4")?),
        Err(TimelapseError::InvalidDimension { .. })
    ));
    assert!(matches!(
        describe_map(&DimensionMap::from_spec("T3X4")?),
        Err(TimelapseError::CorruptSource { .. })
    ));

    let overflowing = DimensionMap::new()
        .with(DimensionTag::Time, usize::MAX, 2)
        .with(DimensionTag::Y, 0, 1)
        .with(DimensionTag::X, 0, 1);
    assert!(matches!(
        describe_map(&overflowing),
        Err(TimelapseError::InvalidDimension { .. })
    ));
    assert_eq!(DimensionBounds::new(usize::MAX, 2).end(), usize::MAX);
    Ok(())
}

#[test]
fn test_index_range_resolve() -> Result<()> {
    assert_eq!(IndexRange::full().resolve(3, 7)?, vec![3, 4, 5, 6]);
    assert_eq!(IndexRange::new(4, 100).with_step(2).resolve(3, 7)?, vec![4, 6]);
    assert!(IndexRange::new(5, 5).resolve(0, 10)?.is_empty());
    assert!(IndexRange::new(2, 4).resolve(3, 7).is_err());
    assert!(IndexRange::full().with_step(0).resolve(0, 3).is_err());
    Ok(())
}

#[test]
fn test_index_range_and_selector_parsing() -> Result<()> {
    assert_eq!("2:8".parse::<IndexRange>()?, IndexRange::new(2, 8));
    assert_eq!("2:8:3".parse::<IndexRange>()?, IndexRange::new(2, 8).with_step(3));

    let open: IndexRange = ":5".parse()?;
    assert_eq!((open.start, open.stop), (None, Some(5)));
    assert!(":".parse::<IndexRange>()?.is_full());
    assert_eq!(IndexRange::new(1, 4).to_string(), "1:4:1");
    assert!("1".parse::<IndexRange>().is_err());
    assert!("a:b".parse::<IndexRange>().is_err());

    assert_eq!("3".parse::<Selector>()?, Selector::Index(3));
    assert_eq!("0:4".parse::<Selector>()?, Selector::Range(IndexRange::new(0, 4)));
    assert!("x".parse::<Selector>().is_err());
    Ok(())
}

#[test]
fn test_parallel_config() -> Result<()> {
    let default_config = ParallelConfig::default();
    assert!(default_config.num_threads.is_none());

    let config_2 = ParallelConfig::with_threads(2);
    assert_eq!(config_2.num_threads, Some(2));
    assert_eq!(config_2.build_pool()?.current_num_threads(), 2);

    let all_cores_config = ParallelConfig::all_cores();
    assert!(all_cores_config.num_threads.unwrap() > 0);

    assert!(matches!(
        ParallelConfig::with_threads(0).build_pool(),
        Err(TimelapseError::InvalidArgument { .. })
    ));
    Ok(())
}
