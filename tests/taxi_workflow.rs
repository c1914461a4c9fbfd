//! End-to-end preparation of the two taxi fixtures
//!
//! Reads both files, cleans them, merges them and engineers a weekday
//! feature, checking intermediate and final results along the way.

use std::path::PathBuf;
use wrangle::expr::{all_of, col};
use wrangle::pipeline::NullRelationship;
use wrangle::record::{ColumnType, Frame, Value};
use wrangle::selector::ColumnSelector;
use wrangle::{Dataflow, Engine, Result, WrangleError};

const COLUMNS: [&str; 6] = [
    "vendor",
    "pickup_datetime",
    "dropoff_datetime",
    "passengers",
    "distance",
    "cost",
];

fn green(engine: &Engine) -> Result<Dataflow> {
    engine
        .read_csv(PathBuf::from("testdata/green_taxi.csv"))?
        .rename_columns(
            [
                "vendorID",
                "lpepPickupDatetime",
                "Lpep_dropoff_datetime",
                "passengerCount",
                "tripDistance",
                "totalAmount",
            ]
            .into_iter()
            .zip(COLUMNS),
        )
}

fn yellow(engine: &Engine) -> Result<Dataflow> {
    engine
        .read_csv(PathBuf::from("testdata/yellow_taxi.csv"))?
        .rename_columns(
            [
                "vendor_name",
                "Trip_Pickup_DateTime",
                "Trip_Dropoff_DateTime",
                "Passenger_Count",
                "Trip_Distance",
                "Total_Amt",
            ]
            .into_iter()
            .zip(COLUMNS),
        )
}

fn clean(raw: &Dataflow) -> Result<Dataflow> {
    raw.replace_na(ColumnSelector::All)?
        .drop_nulls(ColumnSelector::All, NullRelationship::All)
}

fn merged(engine: &Engine) -> Result<Dataflow> {
    let green = clean(&green(engine)?)?;
    let yellow = clean(&yellow(engine)?)?;
    green
        .append_rows(&[&yellow])?
        .replace("distance", ".00", 0)?
        .to_number(["distance", "cost"])?
        .fill_nulls("distance", 0)
}

fn prepared(engine: &Engine) -> Result<Dataflow> {
    merged(engine)?
        .filter(all_of([
            col("distance").gt(0),
            col("distance").lt(10),
            col("cost").lt(20),
        ]))?
        .split_column_auto("pickup_datetime")?
        .derive_column_by_example(
            "pickup_datetime_1",
            "weekday",
            [("2009-01-04", "Sunday"), ("2013-08-22", "Thursday")],
        )
}

fn texts(frame: &Frame, column: &str) -> Vec<String> {
    frame
        .column(column)
        .unwrap()
        .into_iter()
        .map(|v| v.render().into_owned())
        .collect()
}

#[test]
fn test_read_and_rename() -> Result<()> {
    let engine = Engine::new();
    let green = green(&engine)?;

    let schema = green.schema()?;
    let names: Vec<&str> = schema.names().collect();
    assert_eq!(names, COLUMNS);
    assert!(schema.fields().iter().all(|f| f.dtype == ColumnType::Unknown));
    assert_eq!(green.row_count()?, 6);
    Ok(())
}

#[test]
fn test_empty_rows_dropped_after_na_replacement() -> Result<()> {
    let engine = Engine::new();
    let cleaned = clean(&green(&engine)?)?;
    assert_eq!(cleaned.row_count()?, 5);

    let yellow = clean(&yellow(&engine)?)?.head(10)?;
    assert_eq!(yellow.height(), 4);
    assert_eq!(yellow.get(3, "passengers"), Some(&Value::Null));
    Ok(())
}

#[test]
fn test_distance_replace_then_number_then_fill() -> Result<()> {
    let engine = Engine::new();
    let frame = Frame::from_text_rows(&["distance"], &[&[".00"], &["3.5"], &[""]])?;
    let result = engine
        .from_frame(frame)
        .replace("distance", ".00", 0)?
        .to_number("distance")?
        .fill_nulls("distance", 0)?
        .to_frame()?;

    assert_eq!(
        result.column("distance")?,
        vec![&Value::Float(0.0), &Value::Float(3.5), &Value::Float(0.0)]
    );
    assert_eq!(
        result.schema().field(0).map(|f| f.dtype),
        Some(ColumnType::Decimal)
    );
    Ok(())
}

#[test]
fn test_full_preparation() -> Result<()> {
    let engine = Engine::new();
    let prepared = prepared(&engine)?;
    let frame = prepared.to_frame()?;

    let names: Vec<&str> = frame.schema().names().collect();
    assert_eq!(
        names,
        [
            "vendor",
            "pickup_datetime",
            "pickup_datetime_1",
            "weekday",
            "pickup_datetime_2",
            "dropoff_datetime",
            "passengers",
            "distance",
            "cost",
        ]
    );
    assert_eq!(frame.height(), 6);
    assert_eq!(
        texts(&frame, "weekday"),
        ["Thursday", "Friday", "Sunday", "Sunday", "Sunday", "Thursday"]
    );
    assert_eq!(texts(&frame, "pickup_datetime_2")[0], "11:30:00");
    assert_eq!(texts(&frame, "vendor"), ["2", "1", "2", "VTS", "CMT", "DDS"]);
    Ok(())
}

#[test]
fn test_derived_weekday_generalizes() -> Result<()> {
    let engine = Engine::new();
    let frame = Frame::from_text_rows(&["day"], &[&["2020-01-01"], &["2009-01-04"]])?;
    let weekdays = engine
        .from_frame(frame)
        .derive_column_by_example(
            "day",
            "weekday",
            [("2009-01-04", "Sunday"), ("2013-08-22", "Thursday")],
        )?
        .to_frame()?;

    assert_eq!(texts(&weekdays, "weekday"), ["Wednesday", "Sunday"]);
    Ok(())
}

#[test]
fn test_head_is_prefix_of_full_result() -> Result<()> {
    let engine = Engine::new();
    let prepared = prepared(&engine)?;
    let all = prepared.to_frame()?;
    let head = prepared.head(2)?;

    assert_eq!(head.height(), 2);
    assert_eq!(head.rows(), all.rows().get(..2).unwrap());
    Ok(())
}

#[test]
fn test_type_inference_on_prepared_data() -> Result<()> {
    let engine = Engine::new();
    let prepared = prepared(&engine)?;

    let mut builder = prepared.column_types_builder();
    builder.learn()?;
    let proposed = |column: &str| {
        builder
            .inspection()
            .iter()
            .find(|c| c.column == column)
            .map(|c| c.proposed)
    };
    assert_eq!(proposed("vendor"), Some(ColumnType::String));
    assert_eq!(proposed("pickup_datetime"), Some(ColumnType::DateTime));
    assert_eq!(proposed("pickup_datetime_1"), Some(ColumnType::Date));
    assert_eq!(proposed("passengers"), Some(ColumnType::Integer));
    assert_eq!(proposed("distance"), Some(ColumnType::Decimal));
    assert_eq!(proposed("weekday"), Some(ColumnType::String));

    let typed = builder.to_dataflow()?.head(1)?;
    assert_eq!(typed.get(0, "passengers"), Some(&Value::Null));
    assert!(matches!(typed.get(0, "pickup_datetime"), Some(Value::DateTime(_))));
    Ok(())
}

#[test]
fn test_profile_of_prepared_data() -> Result<()> {
    let engine = Engine::new();
    let profile = prepared(&engine)?.get_profile()?;

    assert_eq!(profile.row_count, 6);
    assert!(!profile.sampled);

    let distance = profile.column("distance").unwrap();
    assert_eq!(distance.declared_type, ColumnType::Decimal);
    assert_eq!(distance.min, Some(Value::Float(2.37)));
    assert_eq!(distance.max, Some(Value::Float(5.0)));
    assert_eq!(distance.type_mismatch, 0);

    let passengers = profile.column("passengers").unwrap();
    assert_eq!(passengers.null_count, 2);
    assert_eq!(passengers.effective_type, ColumnType::Integer);
    Ok(())
}

#[test]
fn test_data_errors_surface_at_materialization() -> Result<()> {
    let engine = Engine::new();
    let flow = green(&engine)?.keep_columns(["vendor", "fare"])?;

    let err = flow.head(1).unwrap_err();
    assert!(matches!(err.root(), WrangleError::ColumnNotFound { column } if column == "fare"));
    Ok(())
}
