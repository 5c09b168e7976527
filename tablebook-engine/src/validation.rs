//! Input validation
//!
//! Raw caller input is checked field by field and every problem is collected
//! into one `FieldErrors` map before the store is touched. Field names are the
//! camelCase names callers send.

use chrono::NaiveDate;
use tablebook_core::{
    EntityId, FieldErrors, NewReservation, NewTable, ReservationPatch, ReservationRequest,
    ReservationStatus, ReservationUpdate, SlotTime, UserPatch, ValidationError, YearMonth,
};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// `local@domain.tld`: exactly one `@`, both sides non-empty, a dot in the domain.
pub fn is_valid_email(email: &str) -> bool {
    let mut parts = email.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => {
            !local.is_empty() && !domain.is_empty() && domain.contains('.')
        }
        _ => false,
    }
}

fn parse_day(raw: &str) -> Option<NaiveDate> {
    if raw.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(raw, DATE_FORMAT).ok()
}

fn non_blank(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Validate a booking request on behalf of `owner`.
pub fn validate_request(
    owner: EntityId,
    request: &ReservationRequest,
) -> Result<NewReservation, ValidationError> {
    let mut errors = FieldErrors::new();

    let guest_name = request.guest_name.trim();
    let guest_phone = request.guest_phone.trim();
    let guest_email = request.guest_email.trim();
    let table_number = request.table_number.trim();
    let raw_date = request.date.trim();
    let raw_time = request.time.trim();

    if guest_name.is_empty() {
        errors.add("guestName", "Guest name is required");
    }
    if guest_phone.is_empty() {
        errors.add("guestPhone", "Guest phone is required");
    }
    if guest_email.is_empty() {
        errors.add("guestEmail", "Guest email is required");
    } else if !is_valid_email(guest_email) {
        errors.add("guestEmail", "Invalid email format");
    }

    let date = if raw_date.is_empty() {
        errors.add("date", "Date is required");
        None
    } else {
        let parsed = parse_day(raw_date);
        if parsed.is_none() {
            errors.add("date", "Invalid date format (expected YYYY-MM-DD)");
        }
        parsed
    };

    let time = if raw_time.is_empty() {
        errors.add("time", "Time is required");
        None
    } else {
        let parsed = raw_time.parse::<SlotTime>().ok();
        if parsed.is_none() {
            errors.add("time", "Invalid time format (expected HH:MM)");
        }
        parsed
    };

    if request.guests <= 0 {
        errors.add("guests", "Number of guests must be greater than 0");
    }
    if table_number.is_empty() {
        errors.add("tableNumber", "Table number is required");
    }

    errors.into_result()?;

    match (date, time) {
        (Some(date), Some(time)) => Ok(NewReservation {
            user_id: owner,
            guest_name: guest_name.to_string(),
            guest_phone: guest_phone.to_string(),
            guest_email: guest_email.to_string(),
            date,
            time,
            guests: request.guests,
            table_number: table_number.to_string(),
            special_requests: non_blank(request.special_requests.as_deref()),
        }),
        // Unreachable once the error map is empty.
        _ => Err(ValidationError::RequiredFieldMissing {
            field: "date".to_string(),
        }),
    }
}

/// Validate a partial update. Only provided fields are checked and carried
/// into the patch; an all-`None` update yields an empty patch.
pub fn validate_update(update: &ReservationUpdate) -> Result<ReservationPatch, ValidationError> {
    let mut errors = FieldErrors::new();
    let mut patch = ReservationPatch::default();

    if let Some(raw) = &update.guest_name {
        match non_blank(Some(raw)) {
            Some(name) => patch.guest_name = Some(name),
            None => errors.add("guestName", "Guest name cannot be empty"),
        }
    }
    if let Some(raw) = &update.guest_phone {
        patch.guest_phone = Some(raw.trim().to_string());
    }
    if let Some(raw) = &update.guest_email {
        let email = raw.trim();
        if email.is_empty() {
            errors.add("guestEmail", "Guest email cannot be empty");
        } else if !is_valid_email(email) {
            errors.add("guestEmail", "Invalid email format");
        } else {
            patch.guest_email = Some(email.to_string());
        }
    }
    if let Some(raw) = &update.date {
        match parse_day(raw.trim()) {
            Some(date) => patch.date = Some(date),
            None => errors.add("date", "Invalid date format (expected YYYY-MM-DD)"),
        }
    }
    if let Some(raw) = &update.time {
        match raw.trim().parse::<SlotTime>() {
            Ok(time) => patch.time = Some(time),
            Err(_) => errors.add("time", "Invalid time format (expected HH:MM)"),
        }
    }
    if let Some(guests) = update.guests {
        if guests <= 0 {
            errors.add("guests", "Number of guests must be greater than 0");
        } else {
            patch.guests = Some(guests);
        }
    }
    if let Some(raw) = &update.table_number {
        match non_blank(Some(raw)) {
            Some(number) => patch.table_number = Some(number),
            None => errors.add("tableNumber", "Table number cannot be empty"),
        }
    }
    if let Some(raw) = &update.special_requests {
        patch.special_requests = Some(raw.trim().to_string());
    }

    errors.into_result()?;
    Ok(patch)
}

pub fn parse_status(raw: &str) -> Result<ReservationStatus, ValidationError> {
    raw.parse().map_err(|_| ValidationError::InvalidValue {
        field: "status".to_string(),
        reason: "Invalid status. Must be one of: pending, confirmed, cancelled, completed"
            .to_string(),
    })
}

/// Parse a `YYYY-MM` month string.
pub fn parse_month(raw: &str) -> Result<YearMonth, ValidationError> {
    raw.parse()
}

/// Validate a profile update. Name and e-mail cannot be blanked.
pub fn validate_user_patch(patch: &UserPatch) -> Result<UserPatch, ValidationError> {
    let mut errors = FieldErrors::new();
    let mut clean = UserPatch::default();

    if let Some(raw) = &patch.name {
        match non_blank(Some(raw)) {
            Some(name) => clean.name = Some(name),
            None => errors.add("name", "Name cannot be empty"),
        }
    }
    if let Some(raw) = &patch.email {
        let email = raw.trim();
        if email.is_empty() {
            errors.add("email", "Email cannot be empty");
        } else if !is_valid_email(email) {
            errors.add("email", "Invalid email format");
        } else {
            clean.email = Some(email.to_string());
        }
    }
    clean.phone = patch.phone.as_deref().map(|p| p.trim().to_string());
    clean.photo = patch.photo.as_deref().map(|p| p.trim().to_string());

    errors.into_result()?;
    Ok(clean)
}

/// Validate a new table: a non-blank number and at least one seat.
pub fn validate_new_table(table: &NewTable) -> Result<NewTable, ValidationError> {
    let mut errors = FieldErrors::new();
    let number = table.number.trim();
    if number.is_empty() {
        errors.add("number", "Table number is required");
    }
    if table.capacity <= 0 {
        errors.add("capacity", "Capacity must be greater than 0");
    }
    errors.into_result()?;
    Ok(NewTable {
        number: number.to_string(),
        capacity: table.capacity,
        location: table.location,
    })
}
