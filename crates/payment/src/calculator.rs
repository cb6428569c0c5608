//! Fee calculation engine

use alloy::primitives::{Address, U256};
use types::{FeeError, FeeQuote, FeeSchedule, Result, BASIS_POINTS_DENOMINATOR};

/// Fee calculator over one fee schedule snapshot
///
/// All arithmetic is integer arithmetic on smallest token units. The basis
/// point figure embedded on-chain is derived from the already rounded total
/// fee, so a quote and the signed calldata always agree.
#[derive(Debug, Clone)]
pub struct FeeCalculator {
    schedule: FeeSchedule,
}

impl FeeCalculator {
    /// Create a new fee calculator
    pub fn new(schedule: FeeSchedule) -> Self {
        Self { schedule }
    }

    /// Schedule this calculator quotes with
    pub fn schedule(&self) -> &FeeSchedule {
        &self.schedule
    }

    /// Compute the fee for `amount` smallest units of `token`
    pub fn compute_fee(&self, amount: U256, token: &Address) -> Result<FeeQuote> {
        let terms = self.schedule.get(token).ok_or_else(|| FeeError::UnknownToken {
            token: token.to_string(),
        })?;

        if amount.is_zero() {
            return Err(FeeError::ZeroAmount.into());
        }

        let denominator = U256::from(BASIS_POINTS_DENOMINATOR);

        let percentage_fee = amount
            .checked_mul(U256::from(terms.percentage_bps))
            .map(|v| v / denominator)
            .ok_or(FeeError::CalculationOverflow)?;

        let total_fee = terms
            .flat
            .checked_add(percentage_fee)
            .ok_or(FeeError::CalculationOverflow)?;

        let total_amount = amount
            .checked_add(total_fee)
            .ok_or(FeeError::CalculationOverflow)?;

        let total_fee_basis_points = basis_points_of(total_fee, amount)?;

        Ok(FeeQuote {
            amount,
            flat_fee: terms.flat,
            percentage_fee,
            total_fee,
            total_amount,
            total_fee_basis_points,
            schedule_version: self.schedule.version,
        })
    }

    /// Basis point figure a payer must sign for `amount` of `token`
    pub fn expected_fee_bps(&self, amount: U256, token: &Address) -> Result<u64> {
        Ok(self.compute_fee(amount, token)?.total_fee_basis_points)
    }
}

/// `round_half_up(fee * 10000 / amount)`
pub fn basis_points_of(fee: U256, amount: U256) -> Result<u64> {
    if amount.is_zero() {
        return Err(FeeError::ZeroAmount.into());
    }

    let scaled = fee
        .checked_mul(U256::from(BASIS_POINTS_DENOMINATOR))
        .and_then(|v| v.checked_add(amount / U256::from(2u64)))
        .ok_or(FeeError::CalculationOverflow)?;

    u64::try_from(scaled / amount).map_err(|_| FeeError::CalculationOverflow.into())
}

/// Fee implied by a basis point figure: `floor(amount * bps / 10000)`
pub fn fee_from_basis_points(amount: U256, basis_points: u64) -> Result<U256> {
    amount
        .checked_mul(U256::from(basis_points))
        .map(|v| v / U256::from(BASIS_POINTS_DENOMINATOR))
        .ok_or_else(|| FeeError::CalculationOverflow.into())
}
