use livechat::AppError;

#[test]
fn display_prefixes_match_kind() {
    let cases = [
        (AppError::InvalidInput("x".into()), "invalid input: x"),
        (AppError::NotFound("x".into()), "not found: x"),
        (AppError::Conflict("x".into()), "conflict: x"),
        (AppError::CapacityExceeded("x".into()), "capacity exceeded: x"),
        (AppError::Unauthorized("x".into()), "unauthorized: x"),
        (AppError::Db("x".into()), "db: x"),
    ];
    for (err, expected) in cases {
        assert_eq!(err.to_string(), expected);
    }
}

#[test]
fn infrastructure_errors_are_internal() {
    assert!(AppError::Db("x".into()).is_internal());
    assert!(AppError::Io("x".into()).is_internal());
    assert!(AppError::Config("x".into()).is_internal());
    assert!(AppError::Ipc("x".into()).is_internal());
    assert!(!AppError::Conflict("x".into()).is_internal());
    assert!(!AppError::CapacityExceeded("x".into()).is_internal());
}

#[test]
fn kind_collapses_internal_variants() {
    assert_eq!(AppError::Db("x".into()).kind(), "internal");
    assert_eq!(AppError::Io("x".into()).kind(), "internal");
    assert_eq!(AppError::NotFound("x".into()).kind(), "not_found");
    assert_eq!(
        AppError::CapacityExceeded("x".into()).kind(),
        "capacity_exceeded"
    );
}

#[test]
fn sqlx_row_not_found_maps_to_not_found() {
    let err: AppError = sqlx::Error::RowNotFound.into();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[test]
fn other_sqlx_errors_map_to_db() {
    let err: AppError = sqlx::Error::PoolTimedOut.into();
    assert!(matches!(err, AppError::Db(_)));
}
