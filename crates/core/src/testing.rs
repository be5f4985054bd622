//! In-memory `KashiProtocol` and `LogSource` doubles for engine tests.

use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::sol_types::{SolEvent, SolValue};
use async_trait::async_trait;
use kashi_api::{AddressTransaction, ExplorerError, LogEntry, LogQuery, LogSource};
use kashi_chain::{
    event_signatures, AccrueInfo, BlockRef, BorrowerPosition, ChainError, IBentoBox, IKashiPair,
    KashiProtocol, LiquidationRequest, Rebase, SimulationOutcome,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::time::Duration;

use crate::pair::{InsolventBorrower, Pair, TokenInfo};
use crate::rebase_math::E18;

pub const COLLATERAL_SYMBOL: &str = "WETH";
pub const ASSET_SYMBOL: &str = "USDC";

pub fn addr(byte: u8) -> Address {
    Address::with_last_byte(byte)
}

pub fn u(value: u128) -> U256 {
    U256::from(value)
}

pub fn insolvent_borrower(address: Address, borrow_part: u128, coverage: f64) -> InsolventBorrower {
    InsolventBorrower {
        address,
        collateral_share: U256::ZERO,
        collateral_amount: U256::ZERO,
        borrow_part: u(borrow_part),
        borrow_amount: u(borrow_part),
        borrow_cost_in_collateral: U256::ZERO,
        coverage_percent: coverage,
    }
}

/// On-chain state of one pair.
#[derive(Debug, Clone)]
pub struct MockPair {
    pub address: Address,
    pub collateral: Address,
    pub asset: Address,
    pub oracle: Address,
    pub total_borrow: Rebase,
    pub accrue_info: AccrueInfo,
    pub exchange_rate: U256,
    pub positions: BTreeMap<Address, BorrowerPosition>,
    /// Borrowers whose simulated liquidation succeeds
    pub insolvent: BTreeSet<Address>,
}

impl MockPair {
    /// Pair with 1:1 debt shares and a 1e18 exchange rate.
    pub fn new(address: Address) -> Self {
        Self {
            address,
            collateral: Address::repeat_byte(0xc0),
            asset: Address::repeat_byte(0xa0),
            oracle: Address::repeat_byte(0x0c),
            total_borrow: Rebase::new(u(1_000), u(1_000)),
            accrue_info: AccrueInfo::default(),
            exchange_rate: E18,
            positions: BTreeMap::new(),
            insolvent: BTreeSet::new(),
        }
    }

    pub fn borrower(&mut self, user: Address, collateral_share: u128, borrow_part: u128) -> &mut Self {
        self.positions.insert(
            user,
            BorrowerPosition {
                collateral_share: u(collateral_share),
                borrow_part: u(borrow_part),
            },
        );
        self
    }

    pub fn insolvent(&mut self, user: Address) -> &mut Self {
        self.insolvent.insert(user);
        self
    }

    pub fn to_pair(&self) -> Pair {
        Pair {
            address: self.address,
            collateral: TokenInfo {
                address: self.collateral,
                symbol: COLLATERAL_SYMBOL.to_string(),
            },
            asset: TokenInfo {
                address: self.asset,
                symbol: ASSET_SYMBOL.to_string(),
            },
            oracle: self.oracle,
            borrowers: BTreeSet::new(),
            liquidations: Vec::new(),
            snapshot: None,
        }
    }
}

#[derive(Debug, Default)]
struct ProtocolState {
    pairs: HashMap<Address, MockPair>,
    vaults: HashMap<Address, Rebase>,
    symbols: HashMap<Address, String>,
    symbol_calls: usize,
    simulation_failures: HashMap<Address, u32>,
    rejected_simulations: HashSet<Address>,
    simulations: Vec<(Address, u64, LiquidationRequest)>,
    failing_submissions: HashSet<Address>,
    unconfirmed_submissions: HashSet<Address>,
    submission_delay: Option<Duration>,
    submissions: Vec<(Address, LiquidationRequest)>,
    failing_reads: HashSet<Address>,
}

/// `KashiProtocol` over in-memory pairs.
#[derive(Debug)]
pub struct MockProtocol {
    state: Mutex<ProtocolState>,
    signer: Option<Address>,
    block: BlockRef,
}

impl MockProtocol {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ProtocolState::default()),
            signer: None,
            block: BlockRef {
                number: 100,
                timestamp: 1_700_000_000,
            },
        }
    }

    pub fn with_signer(mut self, signer: Address) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn block(&self) -> BlockRef {
        self.block
    }

    pub fn add_pair(&self, pair: MockPair) {
        let mut state = self.state.lock();
        state
            .symbols
            .insert(pair.collateral, COLLATERAL_SYMBOL.to_string());
        state.symbols.insert(pair.asset, ASSET_SYMBOL.to_string());
        state.pairs.insert(pair.address, pair);
    }

    pub fn set_vault(&self, token: Address, totals: Rebase) {
        self.state.lock().vaults.insert(token, totals);
    }

    /// Fail the next `times` simulations for `borrower` with a transport error.
    pub fn fail_simulations(&self, borrower: Address, times: u32) {
        self.state.lock().simulation_failures.insert(borrower, times);
    }

    /// Answer every simulation for `borrower` with a permanent RPC error.
    pub fn reject_simulations(&self, borrower: Address) {
        self.state.lock().rejected_simulations.insert(borrower);
    }

    /// Broadcast `borrower`'s liquidation but never confirm it.
    pub fn leave_unconfirmed(&self, borrower: Address) {
        self.state.lock().unconfirmed_submissions.insert(borrower);
    }

    /// Time every submission spends waiting for its receipt.
    pub fn set_submission_delay(&self, delay: Duration) {
        self.state.lock().submission_delay = Some(delay);
    }

    pub fn fail_submission(&self, borrower: Address) {
        self.state.lock().failing_submissions.insert(borrower);
    }

    /// Make every pair-level read of `pair` fail.
    pub fn fail_reads(&self, pair: Address) {
        self.state.lock().failing_reads.insert(pair);
    }

    pub fn simulations(&self) -> Vec<(Address, u64, LiquidationRequest)> {
        self.state.lock().simulations.clone()
    }

    pub fn submissions(&self) -> Vec<(Address, LiquidationRequest)> {
        self.state.lock().submissions.clone()
    }

    pub fn symbol_calls(&self) -> usize {
        self.state.lock().symbol_calls
    }

    fn with_pair<T>(
        &self,
        pair: Address,
        read: impl FnOnce(&MockPair) -> T,
    ) -> Result<T, ChainError> {
        let state = self.state.lock();
        if state.failing_reads.contains(&pair) {
            return Err(ChainError::Rpc {
                code: -32000,
                message: "header not found".to_string(),
            });
        }
        state
            .pairs
            .get(&pair)
            .map(read)
            .ok_or_else(|| ChainError::Reverted("unknown pair".to_string()))
    }
}

#[async_trait]
impl KashiProtocol for MockProtocol {
    async fn snapshot_block(&self) -> Result<BlockRef, ChainError> {
        Ok(self.block)
    }

    async fn total_borrow(&self, pair: Address, _block: u64) -> Result<Rebase, ChainError> {
        self.with_pair(pair, |p| p.total_borrow)
    }

    async fn accrue_info(&self, pair: Address, _block: u64) -> Result<AccrueInfo, ChainError> {
        self.with_pair(pair, |p| p.accrue_info)
    }

    async fn vault_totals(&self, token: Address, _block: u64) -> Result<Rebase, ChainError> {
        Ok(self
            .state
            .lock()
            .vaults
            .get(&token)
            .copied()
            .unwrap_or_else(|| Rebase::new(u(1_000_000), u(1_000_000))))
    }

    async fn refresh_exchange_rate(&self, pair: Address, _block: u64) -> Result<U256, ChainError> {
        self.with_pair(pair, |p| p.exchange_rate)
    }

    async fn borrower_position(
        &self,
        pair: Address,
        user: Address,
        _block: u64,
    ) -> Result<BorrowerPosition, ChainError> {
        self.with_pair(pair, |p| p.positions.get(&user).copied().unwrap_or_default())
    }

    async fn simulate_liquidation(
        &self,
        pair: Address,
        request: &LiquidationRequest,
        from: Address,
        block: u64,
    ) -> Result<SimulationOutcome, ChainError> {
        let mut state = self.state.lock();
        state.simulations.push((from, block, request.clone()));

        let user = request.users.first().copied().unwrap_or_default();
        if let Some(remaining) = state.simulation_failures.get_mut(&user) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ChainError::Transport("connection reset".to_string()));
            }
        }
        if state.rejected_simulations.contains(&user) {
            return Err(ChainError::Rpc {
                code: -32602,
                message: "invalid params".to_string(),
            });
        }

        let insolvent = state
            .pairs
            .get(&pair)
            .is_some_and(|p| p.insolvent.contains(&user));
        if insolvent {
            Ok(SimulationOutcome::Succeeded)
        } else {
            Ok(SimulationOutcome::Reverted {
                reason: "KashiPair: all are solvent".to_string(),
            })
        }
    }

    async fn token_symbol(&self, token: Address) -> Result<String, ChainError> {
        let mut state = self.state.lock();
        state.symbol_calls += 1;
        state
            .symbols
            .get(&token)
            .cloned()
            .ok_or_else(|| ChainError::Reverted("symbol()".to_string()))
    }

    async fn submit_liquidation(
        &self,
        pair: Address,
        request: &LiquidationRequest,
    ) -> Result<B256, ChainError> {
        if self.signer.is_none() {
            return Err(ChainError::NoSigner);
        }
        let user = request.users.first().copied().unwrap_or_default();
        if self.state.lock().failing_submissions.contains(&user) {
            return Err(ChainError::Submission("nonce too low".to_string()));
        }

        // Broadcast happens before the receipt wait
        let (tx_hash, delay, unconfirmed) = {
            let mut state = self.state.lock();
            state.submissions.push((pair, request.clone()));
            (
                B256::with_last_byte(state.submissions.len() as u8),
                state.submission_delay,
                state.unconfirmed_submissions.contains(&user),
            )
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if unconfirmed {
            return Err(ChainError::Unconfirmed(tx_hash));
        }
        Ok(tx_hash)
    }

    fn signer(&self) -> Option<Address> {
        self.signer
    }
}

#[derive(Debug, Default)]
struct LogsState {
    deploys: Vec<LogEntry>,
    borrows: HashMap<Address, Vec<LogEntry>>,
    transactions: HashMap<Address, Vec<AddressTransaction>>,
    failing: HashSet<Address>,
    next_block: u64,
}

impl LogsState {
    fn entry(&mut self, topics: Vec<B256>, data: Bytes) -> LogEntry {
        self.next_block += 1;
        LogEntry {
            transaction_hash: B256::left_padding_from(&self.next_block.to_be_bytes()),
            data,
            topics,
            block_number: self.next_block,
            log_index: 0,
        }
    }
}

/// `LogSource` over in-memory logs and transactions.
#[derive(Debug, Default)]
pub struct MockLogs {
    state: Mutex<LogsState>,
}

impl MockLogs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a `LogDeploy` of `pair` by `master`.
    pub fn deploy(&self, master: Address, pair: &MockPair) {
        let event = IBentoBox::LogDeploy {
            masterContract: master,
            data: (pair.collateral, pair.asset, pair.oracle, Bytes::new())
                .abi_encode_params()
                .into(),
            cloneAddress: pair.address,
        };
        let log = event.encode_log_data();
        let mut state = self.state.lock();
        let entry = state.entry(log.topics().to_vec(), log.data.clone());
        state.deploys.push(entry);
    }

    /// Record a `LogBorrow` on `pair` by `borrower`.
    pub fn borrow(&self, pair: Address, borrower: Address) {
        let event = IKashiPair::LogBorrow {
            from: borrower,
            to: borrower,
            amount: u(100),
            feeAmount: U256::ZERO,
            part: u(100),
        };
        let log = event.encode_log_data();
        let mut state = self.state.lock();
        let entry = state.entry(log.topics().to_vec(), log.data.clone());
        state.borrows.entry(pair).or_default().push(entry);
    }

    /// Record a transaction to `pair` carrying `input`.
    pub fn transaction(&self, pair: Address, from: Address, input: Bytes, is_error: bool) {
        let mut state = self.state.lock();
        state.next_block += 1;
        let block_number = state.next_block;
        state
            .transactions
            .entry(pair)
            .or_default()
            .push(AddressTransaction {
                hash: B256::left_padding_from(&block_number.to_be_bytes()),
                from,
                to: Some(pair),
                input: format!("0x{}", alloy::hex::encode(&input)),
                is_error: Some(if is_error { "1" } else { "0" }.to_string()),
                block_number,
            });
    }

    /// Make every query about `pair` fail permanently.
    pub fn fail_pair(&self, pair: Address) {
        self.state.lock().failing.insert(pair);
    }

    fn check(&self, address: Address) -> Result<(), ExplorerError> {
        if self.state.lock().failing.contains(&address) {
            return Err(ExplorerError::Api {
                message: "NOTOK".to_string(),
                result: "Query Timeout occured".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl LogSource for MockLogs {
    async fn fetch_logs(&self, query: &LogQuery) -> Result<Vec<LogEntry>, ExplorerError> {
        self.check(query.address)?;
        let state = self.state.lock();
        let logs: Vec<LogEntry> = if query.topic0 == event_signatures::LOG_DEPLOY {
            state
                .deploys
                .iter()
                .filter(|log| query.topic1.map_or(true, |t| log.topics.get(1) == Some(&t)))
                .cloned()
                .collect()
        } else if query.topic0 == event_signatures::LOG_BORROW {
            state.borrows.get(&query.address).cloned().unwrap_or_default()
        } else {
            Vec::new()
        };
        Ok(logs
            .into_iter()
            .filter(|log| {
                log.block_number >= query.from_block
                    && query.to_block.map_or(true, |to| log.block_number <= to)
            })
            .collect())
    }

    async fn fetch_address_transactions(
        &self,
        address: Address,
        from_block: u64,
    ) -> Result<Vec<AddressTransaction>, ExplorerError> {
        self.check(address)?;
        Ok(self
            .state
            .lock()
            .transactions
            .get(&address)
            .map(|txs| {
                txs.iter()
                    .filter(|tx| tx.block_number >= from_block && tx.succeeded())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
