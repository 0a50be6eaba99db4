use sqlx::{Postgres, Transaction};

/// Atomic decrement-with-floor. The guarded UPDATE takes the row lock, so
/// two registrations racing for the last unit cannot both succeed; only
/// `remaining_uses` is touched.
pub async fn decrement(
    tx: &mut Transaction<'_, Postgres>,
    coupon_id: i64,
) -> Result<bool, String> {
    let result = sqlx::query(
        "UPDATE coupons SET remaining_uses = remaining_uses - 1 \
         WHERE id = $1 AND remaining_uses > 0",
    )
    .bind(coupon_id)
    .execute(&mut **tx)
    .await
    .map_err(|e| format!("Failed to redeem coupon: {}", e))?;

    Ok(result.rows_affected() == 1)
}
