//! Printable transfer register built from the request snapshots.

use std::io::Write;

use serde::Serialize;

use super::domain::{TransferRequest, TransferStatus};

#[derive(Debug, Serialize)]
struct RegisterRow<'a> {
    transfer_id: &'a str,
    status: &'static str,
    inmate_id: &'a str,
    inmate_name: String,
    crime: &'a str,
    from_prison: &'a str,
    to_prison: &'a str,
    reason: &'a str,
    requested_by: &'a str,
    requested_role: &'static str,
    request_date: String,
    decided_by: &'a str,
    rejection_reason: &'a str,
    population_settled: bool,
}

impl<'a> RegisterRow<'a> {
    fn from_request(request: &'a TransferRequest) -> Self {
        let details = &request.request_details;
        let settled = request.status == TransferStatus::Approved
            && request.population.is_settled();

        Self {
            transfer_id: &request.id.0,
            status: request.status.label(),
            inmate_id: &request.inmate_id.0,
            inmate_name: request.inmate_data.full_name(),
            crime: &request.inmate_data.crime,
            from_prison: details
                .from_prison_name
                .as_deref()
                .unwrap_or("Not Assigned"),
            to_prison: &details.to_prison_name,
            reason: &request.reason,
            requested_by: &details.requested_by.actor_id,
            requested_role: details.requested_by.role.label(),
            request_date: details.request_date.format("%Y-%m-%d %H:%M").to_string(),
            decided_by: request
                .decided_by()
                .map(|actor| actor.id.as_str())
                .unwrap_or(""),
            rejection_reason: request.rejection_reason.as_deref().unwrap_or(""),
            population_settled: settled,
        }
    }
}

/// Write one CSV row per transfer. The header is emitted with the first row.
pub fn write_transfer_register<W: Write>(
    writer: W,
    transfers: &[TransferRequest],
) -> Result<(), csv::Error> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for request in transfers {
        csv_writer.serialize(RegisterRow::from_request(request))?;
    }
    csv_writer.flush()?;
    Ok(())
}
