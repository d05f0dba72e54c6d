use crate::piece_math::EPOCHS_PER_HOUR;
use crate::settings::SenderSettings;
use crate::types::{AssignedDeal, ChainEpoch};
use rust_decimal::Decimal;
use thiserror::Error;

/// storage market bounds on deal length, in epochs (180 and ~535 days)
pub const MIN_DEAL_DURATION: i64 = 518_400;
pub const MAX_DEAL_DURATION: i64 = 1_540_000;

/// the terms of one on-chain proposal. rebuilt for every attempt, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DealConfig {
    pub verified_deal: bool,
    pub fast_retrieval: bool,
    /// always true in practice, nobody is at a terminal to confirm autobid deals
    pub skip_confirmation: bool,
    pub price: Decimal,
    pub start_epoch: ChainEpoch,
    pub duration: i64,
    pub miner_fid: String,
    pub sender_wallet: String,
}

/// the parts of a proposal that come from the assigned deal rather than the config file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutobidTerms {
    pub miner_fid: String,
    pub start_epoch: ChainEpoch,
}

impl AutobidTerms {
    /// the deal starts `start_epoch_hours` (plus one hour of slack) from now
    pub fn for_deal(sender: &SenderSettings, deal: &AssignedDeal, now: ChainEpoch) -> Self {
        Self {
            miner_fid: deal.miner_fid.trim().to_string(),
            start_epoch: now + ChainEpoch((sender.start_epoch_hours + 1) * EPOCHS_PER_HOUR),
        }
    }
}

impl DealConfig {
    pub fn build(sender: &SenderSettings, terms: &AutobidTerms) -> Self {
        Self {
            verified_deal: sender.verified_deal,
            fast_retrieval: sender.fast_retrieval,
            skip_confirmation: sender.skip_confirmation,
            price: sender.price,
            start_epoch: terms.start_epoch,
            duration: sender.duration,
            miner_fid: terms.miner_fid.clone(),
            sender_wallet: sender.wallet.clone(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigRejection {
    #[error("no miner assigned")]
    MissingMiner,
    #[error("no sender wallet configured")]
    MissingWallet,
    #[error("price {price} is higher than max price {max_price}")]
    PriceAboveMax { price: Decimal, max_price: Decimal },
    #[error("duration {0} is outside [{}, {}] epochs", MIN_DEAL_DURATION, MAX_DEAL_DURATION)]
    DurationOutOfRange(i64),
    #[error("start epoch {start} is not after the current epoch {now}")]
    StartEpochPassed { start: ChainEpoch, now: ChainEpoch },
}

/// would the miner and the market take this proposal
pub fn check(
    sender: &SenderSettings,
    config: &DealConfig,
    now: ChainEpoch,
) -> Result<(), ConfigRejection> {
    if config.miner_fid.is_empty() {
        return Err(ConfigRejection::MissingMiner);
    }
    if config.sender_wallet.trim().is_empty() {
        return Err(ConfigRejection::MissingWallet);
    }
    if config.price > sender.max_price {
        return Err(ConfigRejection::PriceAboveMax {
            price: config.price,
            max_price: sender.max_price,
        });
    }
    if !(MIN_DEAL_DURATION..=MAX_DEAL_DURATION).contains(&config.duration) {
        return Err(ConfigRejection::DurationOutOfRange(config.duration));
    }
    if config.start_epoch <= now {
        return Err(ConfigRejection::StartEpochPassed {
            start: config.start_epoch,
            now,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fakes::{assigned_deal, sender_settings};
    use std::str::FromStr;

    const NOW: ChainEpoch = ChainEpoch(3_000_000);

    fn config() -> (SenderSettings, DealConfig) {
        let sender = sender_settings();
        let terms = AutobidTerms::for_deal(&sender, &assigned_deal(1), NOW);
        let config = DealConfig::build(&sender, &terms);
        (sender, config)
    }

    #[test]
    fn start_epoch_is_hours_plus_one_ahead() {
        let (sender, config) = config();
        assert_eq!(
            config.start_epoch,
            ChainEpoch(NOW.0 + (sender.start_epoch_hours + 1) * 120)
        );
        assert_eq!(config.miner_fid, "f01234");
        assert_eq!(config.sender_wallet, sender.wallet);
        assert_eq!(check(&sender, &config, NOW), Ok(()));
    }

    #[test]
    fn price_over_max_is_rejected() {
        let (mut sender, config) = config();
        sender.max_price = Decimal::from_str("0.00001").unwrap();
        let config = DealConfig {
            price: Decimal::from_str("0.0001").unwrap(),
            ..config
        };
        assert!(matches!(
            check(&sender, &config, NOW),
            Err(ConfigRejection::PriceAboveMax { .. })
        ));
    }

    #[test]
    fn duration_bounds() {
        let (sender, config) = config();
        let short = DealConfig {
            duration: MIN_DEAL_DURATION - 1,
            ..config.clone()
        };
        assert_eq!(
            check(&sender, &short, NOW),
            Err(ConfigRejection::DurationOutOfRange(MIN_DEAL_DURATION - 1))
        );
        let edge = DealConfig {
            duration: MAX_DEAL_DURATION,
            ..config
        };
        assert_eq!(check(&sender, &edge, NOW), Ok(()));
    }

    #[test]
    fn missing_parties_and_stale_start() {
        let (sender, config) = config();
        let no_miner = DealConfig {
            miner_fid: String::new(),
            ..config.clone()
        };
        assert_eq!(
            check(&sender, &no_miner, NOW),
            Err(ConfigRejection::MissingMiner)
        );

        let no_wallet = DealConfig {
            sender_wallet: " ".into(),
            ..config.clone()
        };
        assert_eq!(
            check(&sender, &no_wallet, NOW),
            Err(ConfigRejection::MissingWallet)
        );

        let later = config.start_epoch;
        assert!(matches!(
            check(&sender, &config, later),
            Err(ConfigRejection::StartEpochPassed { .. })
        ));
    }
}
