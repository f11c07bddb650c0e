//! hodl-genesis
//!
//! The genesis JSON document and `InitChain` seeding. Genesis writes
//! directly into the state image without going through the transaction
//! pipeline — it is the one place where accounts, balances, validators,
//! companies, and markets appear without signatures. Any validation failure
//! aborts node start.

use serde::{Deserialize, Serialize};
use tracing::info;

use hodl_bank::Bank;
use hodl_core::coin::{validate_denom, Coin, DENOM_UHODL};
use hodl_core::dec::Dec;
use hodl_core::error::Error;
use hodl_core::events::EventManager;
use hodl_core::msg::{FounderAllocation, ShareClassSpec};
use hodl_core::params::Params;
use hodl_core::tier::Tier;
use hodl_core::types::{Address, Amount, HRP_ACCOUNT};
use hodl_dex::Dex;
use hodl_equity::{Equity, VerificationView};
use hodl_store::Store;
use hodl_validator::Validators;

/// One funded genesis account.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenesisAccount {
    /// Bech32 `hodl1…` address.
    pub address: String,
    pub balances: Vec<Coin>,
    #[serde(default)]
    pub jurisdiction: Option<String>,
}

/// A validator bonded at genesis.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenesisValidator {
    pub operator: String,
    /// Bonded uhodl; must clear the Bronze floor.
    pub stake: Amount,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenesisShareClass {
    pub class_id: String,
    pub authorized: Amount,
    pub voting_weight: Dec,
}

/// A company listed at genesis, with its ACME/HODL market.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenesisCompany {
    pub symbol: String,
    pub name: String,
    pub jurisdiction: String,
    pub owner: String,
    pub classes: Vec<GenesisShareClass>,
    /// (address, class_id, shares) founder allocations.
    pub founders: Vec<(String, String, Amount)>,
    /// Market tick size in uhodl per lot.
    pub tick_size: Amount,
    /// Market lot size in base units.
    pub lot_size: Amount,
}

/// The genesis document, loaded verbatim by `InitChain`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Genesis {
    pub chain_id: String,
    #[serde(default)]
    pub params: Params,
    pub accounts: Vec<GenesisAccount>,
    #[serde(default)]
    pub validators: Vec<GenesisValidator>,
    #[serde(default)]
    pub companies: Vec<GenesisCompany>,
}

impl Genesis {
    pub fn from_json(raw: &str) -> Result<Genesis, Error> {
        let genesis: Genesis =
            serde_json::from_str(raw).map_err(|e| Error::Decode(e.to_string()))?;
        genesis.validate()?;
        Ok(genesis)
    }

    /// Structural validation: bech32 addresses, denom rules, duplicate
    /// symbols, stake floors, parameter sanity.
    pub fn validate(&self) -> Result<(), Error> {
        if self.chain_id.is_empty() {
            return Err(Error::Decode("chain_id must be non-empty".into()));
        }
        self.params.validate()?;

        let mut seen_addrs = std::collections::BTreeSet::new();
        for acc in &self.accounts {
            let addr = Address::from_bech32(&acc.address, HRP_ACCOUNT)?;
            if !seen_addrs.insert(addr) {
                return Err(Error::Decode(format!("duplicate account {}", acc.address)));
            }
            for coin in &acc.balances {
                validate_denom(&coin.denom)?;
                if coin.amount == 0 {
                    return Err(Error::Decode(format!(
                        "zero balance for {} in {}",
                        coin.denom, acc.address
                    )));
                }
            }
        }

        for v in &self.validators {
            Address::from_bech32(&v.operator, HRP_ACCOUNT)?;
            if Tier::from_stake(v.stake).is_none() {
                return Err(Error::StakeBelowMinimum {
                    min: hodl_core::tier::TIER_BOUNDS[0],
                    got: v.stake,
                });
            }
        }

        let mut seen_symbols = std::collections::BTreeSet::new();
        for c in &self.companies {
            hodl_core::coin::validate_symbol(&c.symbol)?;
            if !seen_symbols.insert(c.symbol.clone()) {
                return Err(Error::Decode(format!("duplicate company {}", c.symbol)));
            }
            Address::from_bech32(&c.owner, HRP_ACCOUNT)?;
            if c.classes.is_empty() {
                return Err(Error::Decode(format!("company {} has no classes", c.symbol)));
            }
            if c.tick_size == 0 || c.lot_size == 0 {
                return Err(Error::Decode(format!(
                    "company {} market sizes must be positive",
                    c.symbol
                )));
            }
            for (addr, class_id, shares) in &c.founders {
                Address::from_bech32(addr, HRP_ACCOUNT)?;
                if *shares == 0 {
                    return Err(Error::Decode(format!(
                        "zero founder allocation in {}", c.symbol
                    )));
                }
                if !c.classes.iter().any(|cl| cl.class_id == *class_id) {
                    return Err(Error::Decode(format!(
                        "unknown founder class {class_id} in {}",
                        c.symbol
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Genesis companies skip the verification gate; this stand-in approves
/// whatever `apply` feeds it.
struct GenesisApproval;

impl VerificationView for GenesisApproval {
    fn is_approved(&self, _store: &dyn Store, _id: u64, _symbol: &str) -> Result<bool, Error> {
        Ok(true)
    }
}

/// Seed a validated genesis document into an empty state image. Returns the
/// events emitted by the seeded keepers (discarded by `InitChain`; useful in
/// tests).
pub fn apply<S: Store>(
    store: &mut S,
    genesis: &Genesis,
    bank: &Bank,
    equity: &Equity,
    dex: &Dex,
    validators: &Validators,
) -> Result<EventManager, Error> {
    let mut events = EventManager::new();

    hodl_store::set_typed(store, b"params", &genesis.params)?;

    // ── Accounts & balances ──────────────────────────────────────────────────
    for acc in &genesis.accounts {
        let addr = Address::from_bech32(&acc.address, HRP_ACCOUNT)?;
        for coin in &acc.balances {
            bank.mint(store, &addr, coin)?;
        }
        if let Some(j) = &acc.jurisdiction {
            equity.set_jurisdiction(store, &addr, j)?;
        }
    }

    // ── Validators ───────────────────────────────────────────────────────────
    for v in &genesis.validators {
        let operator = Address::from_bech32(&v.operator, HRP_ACCOUNT)?;
        // Stake is minted straight into the bond; genesis validators do not
        // need a pre-funded balance.
        bank.mint(store, &operator, &Coin::uhodl(v.stake))?;
        validators.register_tier(store, &mut events, &operator, v.stake, 0)?;
    }

    // ── Companies & markets ──────────────────────────────────────────────────
    for c in &genesis.companies {
        let owner = Address::from_bech32(&c.owner, HRP_ACCOUNT)?;
        let classes: Vec<ShareClassSpec> = c
            .classes
            .iter()
            .map(|cl| ShareClassSpec {
                class_id: cl.class_id.clone(),
                authorized: cl.authorized,
                voting_weight: cl.voting_weight,
                restrictions: vec![],
            })
            .collect();
        let founders: Vec<FounderAllocation> = c
            .founders
            .iter()
            .map(|(addr, class_id, shares)| {
                Ok(FounderAllocation {
                    address: Address::from_bech32(addr, HRP_ACCOUNT)?,
                    class_id: class_id.clone(),
                    shares: *shares,
                })
            })
            .collect::<Result<_, Error>>()?;

        let company = equity.create_company(
            store,
            &mut events,
            &GenesisApproval,
            &owner,
            0,
            &c.symbol,
            &c.name,
            &c.jurisdiction,
            &classes,
            &founders,
            0,
        )?;

        let market_symbol = format!("{}/HODL", c.symbol);
        let base_denom = company.classes[0].denom.clone();
        dex.create_market(
            store,
            &mut events,
            &market_symbol,
            &base_denom,
            DENOM_UHODL,
            c.tick_size,
            c.lot_size,
            c.lot_size,
            c.lot_size.saturating_mul(1_000_000_000),
            genesis.params.dex.default_maker_fee,
            genesis.params.dex.default_taker_fee,
        )?;
    }

    // Supply conservation must hold before the first block.
    bank.assert_supply(store)?;
    equity.assert_cap_table(store)?;

    info!(
        chain_id = %genesis.chain_id,
        accounts = genesis.accounts.len(),
        validators = genesis.validators.len(),
        companies = genesis.companies.len(),
        "genesis state applied"
    );
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hodl_core::constants::UHODL_PER_HODL;
    use hodl_store::MemStore;

    fn addr_str(n: u8) -> String {
        Address::from_bytes([n; 20]).to_account()
    }

    fn sample() -> Genesis {
        Genesis {
            chain_id: "sharehodl-1".into(),
            params: Params::default(),
            accounts: vec![GenesisAccount {
                address: addr_str(1),
                balances: vec![Coin::uhodl(1_000_000), Coin::new("ustake", 2_000_000)],
                jurisdiction: Some("US".into()),
            }],
            validators: vec![GenesisValidator {
                operator: addr_str(2),
                stake: 60_000 * UHODL_PER_HODL,
            }],
            companies: vec![GenesisCompany {
                symbol: "ACME".into(),
                name: "Acme Corp".into(),
                jurisdiction: "US".into(),
                owner: addr_str(1),
                classes: vec![GenesisShareClass {
                    class_id: "common".into(),
                    authorized: 2_000 * 1_000_000,
                    voting_weight: Dec::ONE,
                }],
                founders: vec![(addr_str(1), "common".into(), 1_000 * 1_000_000)],
                tick_size: 10_000,
                lot_size: 1_000_000,
            }],
        }
    }

    #[test]
    fn json_round_trip_and_apply() {
        let genesis = sample();
        let raw = serde_json::to_string(&genesis).unwrap();
        let parsed = Genesis::from_json(&raw).unwrap();
        assert_eq!(parsed.chain_id, "sharehodl-1");

        let mut store = MemStore::new();
        let bank = Bank::new();
        let equity = Equity::new(bank.clone());
        let dex = Dex::new(bank.clone());
        let validators = Validators::new(bank.clone());
        apply(&mut store, &parsed, &bank, &equity, &dex, &validators).unwrap();

        let addr = Address::from_bech32(&addr_str(1), HRP_ACCOUNT).unwrap();
        assert_eq!(bank.balance(&store, &addr, DENOM_UHODL).unwrap(), 1_000_000);
        assert!(equity.company(&store, "ACME").unwrap().is_some());
        assert!(dex.market(&store, "ACME/HODL").unwrap().is_some());
        let op = Address::from_bech32(&addr_str(2), HRP_ACCOUNT).unwrap();
        assert_eq!(
            validators.validator(&store, &op).unwrap().unwrap().tier,
            Tier::Bronze
        );
    }

    #[test]
    fn duplicate_symbol_rejected() {
        let mut genesis = sample();
        genesis.companies.push(genesis.companies[0].clone());
        assert!(genesis.validate().is_err());
    }

    #[test]
    fn understaked_genesis_validator_rejected() {
        let mut genesis = sample();
        genesis.validators[0].stake = 1;
        assert!(genesis.validate().is_err());
    }

    #[test]
    fn malformed_address_rejected() {
        let mut genesis = sample();
        genesis.accounts[0].address = "cosmos1notours".into();
        assert!(genesis.validate().is_err());
    }
}
