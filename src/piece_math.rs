use crate::types::{ChainEpoch, PieceSize, SectorSize};
use rust_decimal::Decimal;
use thiserror::Error;

/// prices are quoted in FIL per GiB of sector
const BYTES_PER_GIB: u64 = 1 << 30;

/// fr32 padding: 254 usable bits out of every 256
const FR32_USABLE: u128 = 254;
const FR32_TOTAL: u128 = 256;

/// unix time of the mainnet genesis block
pub const GENESIS_UNIX_SECS: i64 = 1_598_306_400;
pub const EPOCH_DURATION_SECS: i64 = 30;
pub const EPOCHS_PER_HOUR: i64 = 3600 / EPOCH_DURATION_SECS;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EconomicsError {
    #[error("file size {0:?} is not an integer")]
    Unparseable(String),
    #[error("file size must be positive, got {0}")]
    NotPositive(i64),
    #[error("file size {0} does not fit in any sector")]
    TooLarge(u64),
    #[error("cost overflows at price {price} for sector size {sector_size}")]
    CostOverflow { price: Decimal, sector_size: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DealEconomics {
    pub piece_size: PieceSize,
    pub sector_size: SectorSize,
    pub cost: Decimal,
}

fn usable_bytes(sector_size: u64) -> u64 {
    (sector_size as u128 * FR32_USABLE / FR32_TOTAL) as u64
}

/// smallest power-of-two sector whose fr32-unpadded capacity holds `file_size`.
/// returns None for zero or for sizes past the largest u64 power of two.
pub fn padded_sizes(file_size: u64) -> Option<(PieceSize, SectorSize)> {
    if file_size == 0 {
        return None;
    }
    let mut sector = file_size.checked_next_power_of_two()?;
    if file_size > usable_bytes(sector) {
        sector = sector.checked_mul(2)?;
    }
    Some((PieceSize(usable_bytes(sector)), SectorSize(sector)))
}

/// price is per GiB, so the cost scales with the sector, not the raw file
pub fn real_cost(sector_size: SectorSize, price: Decimal) -> Option<Decimal> {
    let gibs = Decimal::from(sector_size.0).checked_div(Decimal::from(BYTES_PER_GIB))?;
    gibs.checked_mul(price)
}

/// parse the declared file size and work out what the deal costs
pub fn deal_economics(file_size: &str, price: Decimal) -> Result<DealEconomics, EconomicsError> {
    let size: i64 = file_size
        .trim()
        .parse()
        .map_err(|_| EconomicsError::Unparseable(file_size.to_string()))?;
    if size <= 0 {
        return Err(EconomicsError::NotPositive(size));
    }
    let size = size as u64;
    let (piece_size, sector_size) = padded_sizes(size).ok_or(EconomicsError::TooLarge(size))?;
    let cost = real_cost(sector_size, price).ok_or(EconomicsError::CostOverflow {
        price,
        sector_size: sector_size.0,
    })?;
    Ok(DealEconomics {
        piece_size,
        sector_size,
        cost,
    })
}

pub fn epoch_at(unix_secs: i64) -> ChainEpoch {
    ChainEpoch((unix_secs - GENESIS_UNIX_SECS) / EPOCH_DURATION_SECS)
}

/// best guess at the chain head from the wall clock, no rpc needed
pub fn current_epoch() -> ChainEpoch {
    epoch_at(chrono::Utc::now().timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn one_gib_spills_into_the_next_sector() {
        let econ = deal_economics("1073741824", Decimal::ZERO).unwrap();
        assert_eq!(econ.sector_size, SectorSize(2 << 30));
        assert_eq!(econ.piece_size, PieceSize(2_130_706_432));
        assert_eq!(econ.cost, Decimal::ZERO);
    }

    #[test]
    fn sizes_that_fit_after_padding_stay_in_their_sector() {
        // 1016 MiB is exactly the usable part of a 1 GiB sector
        let (piece, sector) = padded_sizes(1_065_353_216).unwrap();
        assert_eq!(sector, SectorSize(1 << 30));
        assert_eq!(piece, PieceSize(1_065_353_216));

        let (piece, sector) = padded_sizes(1_065_353_217).unwrap();
        assert_eq!(sector, SectorSize(2 << 30));
        assert_eq!(piece, PieceSize(2_130_706_432));
    }

    #[test]
    fn tiny_files() {
        assert_eq!(padded_sizes(1), Some((PieceSize(1), SectorSize(2))));
        assert_eq!(padded_sizes(200), Some((PieceSize(254), SectorSize(256))));
        assert_eq!(padded_sizes(0), None);
    }

    #[test]
    fn huge_files_do_not_overflow() {
        assert_eq!(padded_sizes(u64::MAX), None);
        assert_eq!(
            deal_economics(&i64::MAX.to_string(), Decimal::ONE),
            Err(EconomicsError::TooLarge(i64::MAX as u64))
        );
    }

    #[test]
    fn cost_is_price_per_gib_of_sector() {
        let price = Decimal::from_str("0.0005").unwrap();
        // 3 GiB of data needs a 4 GiB sector
        let econ = deal_economics(&(3u64 << 30).to_string(), price).unwrap();
        assert_eq!(econ.sector_size, SectorSize(4 << 30));
        assert_eq!(econ.cost, Decimal::from_str("0.002").unwrap());
    }

    #[test]
    fn bad_sizes_are_rejected() {
        assert_eq!(
            deal_economics("0", Decimal::ONE),
            Err(EconomicsError::NotPositive(0))
        );
        assert_eq!(
            deal_economics("-12", Decimal::ONE),
            Err(EconomicsError::NotPositive(-12))
        );
        assert!(matches!(
            deal_economics("12kb", Decimal::ONE),
            Err(EconomicsError::Unparseable(_))
        ));
        assert!(matches!(
            deal_economics("", Decimal::ONE),
            Err(EconomicsError::Unparseable(_))
        ));
    }

    #[test]
    fn epochs_count_from_genesis() {
        assert_eq!(epoch_at(GENESIS_UNIX_SECS), ChainEpoch(0));
        assert_eq!(epoch_at(GENESIS_UNIX_SECS + 3600), ChainEpoch(EPOCHS_PER_HOUR));
        assert!(current_epoch() > ChainEpoch(3_000_000));
    }
}
