//! EC2-style identifier encoding.

/// Encode a numeric volume id as its EC2 identifier: `vol-` followed by
/// eight lowercase hex digits.
pub fn id_to_ec2_vol_id(volume_id: i64) -> String {
    format!("vol-{:08x}", volume_id)
}
