use crate::error::{AppError, AppResult, ValidationError};

pub(super) fn parse_positive_u64(s: &str) -> AppResult<u64> {
    let value = s.trim().parse::<u64>().map_err(|source| {
        AppError::validation(ValidationError::InvalidNumber {
            value: s.to_owned(),
            source,
        })
    })?;
    if value == 0 {
        return Err(AppError::validation(ValidationError::ValueTooSmall));
    }
    Ok(value)
}

pub(super) fn parse_positive_u32(s: &str) -> AppResult<u32> {
    let value = s.trim().parse::<u32>().map_err(|source| {
        AppError::validation(ValidationError::InvalidNumber {
            value: s.to_owned(),
            source,
        })
    })?;
    if value == 0 {
        return Err(AppError::validation(ValidationError::ValueTooSmall));
    }
    Ok(value)
}

pub(super) fn parse_positive_usize(s: &str) -> AppResult<usize> {
    let value = s.trim().parse::<usize>().map_err(|source| {
        AppError::validation(ValidationError::InvalidNumber {
            value: s.to_owned(),
            source,
        })
    })?;
    if value == 0 {
        return Err(AppError::validation(ValidationError::ValueTooSmall));
    }
    Ok(value)
}

pub(super) fn parse_worker_name(s: &str) -> AppResult<String> {
    let name = s.trim();
    if name.is_empty() {
        return Err(AppError::validation(ValidationError::EmptyWorkerName));
    }
    Ok(name.to_owned())
}
