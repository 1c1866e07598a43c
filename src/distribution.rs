//! Pro-rata repayment allocation.
//!
//! A repayment is split across active investments in whole cents. Each
//! investment's ideal share is `amount * weight / total_weight`, capped at the
//! return it is still owed; whatever the caps cut off is re-spread over the
//! uncapped investments. Shares are then floored to cents and the leftover
//! cents go one each to the largest fractional remainders, earliest position
//! first on ties. The shares always sum to `amount` exactly.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AllocationError {
    #[error("Repayment amount must be a positive amount in whole cents")]
    InvalidAmount,

    #[error("No active investments to distribute to")]
    NoRecipients,

    #[error("Repayment {amount} exceeds the outstanding return of {outstanding}")]
    ExceedsOutstanding { amount: Decimal, outstanding: Decimal },
}

/// One recipient of a repayment
#[derive(Debug, Clone, Copy)]
pub struct Claim {
    /// Principal invested; drives the pro-rata weight
    pub weight: Decimal,
    /// Return still owed; no share may exceed it
    pub cap: Decimal,
}

/// Money columns hold two decimal places; anything finer cannot be stored
pub fn is_whole_cents(amount: Decimal) -> bool {
    amount.round_dp(2) == amount
}

fn to_cents(amount: Decimal) -> Option<i64> {
    if !is_whole_cents(amount) {
        return None;
    }
    (amount * Decimal::ONE_HUNDRED).to_i64()
}

fn from_cents(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

/// Split `amount` across `claims`, returning one share per claim in order.
///
/// Callers order claims by investment date so ties favour earlier investors.
pub fn allocate(amount: Decimal, claims: &[Claim]) -> Result<Vec<Decimal>, AllocationError> {
    let total_cents = match to_cents(amount) {
        Some(c) if c > 0 => c,
        _ => return Err(AllocationError::InvalidAmount),
    };
    if claims.is_empty() {
        return Err(AllocationError::NoRecipients);
    }

    // Caps are stored at cent precision; anything finer is floored away.
    let caps: Vec<i64> = claims
        .iter()
        .map(|c| {
            (c.cap.max(Decimal::ZERO) * Decimal::ONE_HUNDRED)
                .floor()
                .to_i64()
                .unwrap_or(0)
        })
        .collect();

    let outstanding: i64 = caps.iter().sum();
    if total_cents > outstanding {
        return Err(AllocationError::ExceedsOutstanding {
            amount,
            outstanding: from_cents(outstanding),
        });
    }

    let mut shares = vec![0i64; claims.len()];
    let mut open: Vec<usize> = (0..claims.len())
        .filter(|&i| caps[i] > 0 && claims[i].weight > Decimal::ZERO)
        .collect();
    let mut remaining = total_cents;

    // Water-filling: pin every claim whose ideal share reaches its cap, then
    // recompute the ideals for the rest until nobody else hits a cap.
    let ideals = loop {
        if open.is_empty() {
            break Vec::new();
        }
        let weight_sum: Decimal = open.iter().map(|&i| claims[i].weight).sum();
        let remaining_dec = Decimal::from(remaining);
        let ideals: Vec<(usize, Decimal)> = open
            .iter()
            .map(|&i| (i, remaining_dec * claims[i].weight / weight_sum))
            .collect();

        let capped: Vec<usize> = ideals
            .iter()
            .filter(|(i, ideal)| *ideal >= Decimal::from(caps[*i]))
            .map(|(i, _)| *i)
            .collect();
        if capped.is_empty() {
            break ideals;
        }
        for i in capped {
            shares[i] = caps[i];
            remaining -= caps[i];
        }
        open.retain(|&i| shares[i] == 0);
    };

    if ideals.is_empty() {
        // Every open claim was pinned at its cap; the outstanding check
        // guarantees nothing is left over.
        return Ok(shares.into_iter().map(from_cents).collect());
    }

    let mut remainders: Vec<(usize, Decimal)> = Vec::with_capacity(ideals.len());
    let mut assigned = 0i64;
    for (i, ideal) in ideals {
        let floor = ideal.floor();
        let cents = floor.to_i64().unwrap_or(0);
        shares[i] = cents;
        assigned += cents;
        remainders.push((i, ideal - floor));
    }

    // Largest remainder first, lower index first on ties.
    remainders.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    let leftover = remaining - assigned;
    for (i, _) in remainders.into_iter().take(leftover.max(0) as usize) {
        shares[i] += 1;
    }

    Ok(shares.into_iter().map(from_cents).collect())
}
