//! Shared fixtures: a mined regtest chain, an in-memory store, and a scripted
//! peer network.

#![allow(dead_code)]

use blvm_sync::network::protocol::{HeadersMessage, MAX_HEADERS_RESULTS};
use blvm_sync::network::{ChainAccess, Channel, Connector, SyncMessage};
use blvm_sync::{Block, BlockHeader, Checkpoint, Hash, SyncError};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::time::Duration;

pub const REGTEST_BITS: u32 = 0x207f_ffff;

/// Inactivity after which a mock channel reports a transport timeout
pub const TRANSPORT_TIMEOUT: Duration = Duration::from_secs(30);

pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Mine `count` linked regtest headers on top of `previous`
pub fn mine_headers(previous: Hash, base_height: u64, count: usize) -> Vec<BlockHeader> {
    let mut headers = Vec::with_capacity(count);
    let mut previous = previous;
    for offset in 0..count as u64 {
        let height = base_height + offset;
        let mut header = BlockHeader {
            version: 1,
            prev_block_hash: previous,
            merkle_root: {
                let mut root = [0u8; 32];
                root[..8].copy_from_slice(&height.to_le_bytes());
                root
            },
            timestamp: 1_296_688_602 + height as u32,
            bits: REGTEST_BITS,
            nonce: 0,
        };
        while !header.check() {
            header.nonce += 1;
        }
        previous = header.hash();
        headers.push(header);
    }
    headers
}

/// A mined chain from genesis (height 0) to `tip`
pub struct TestChain {
    headers: Vec<BlockHeader>,
    blocks: HashMap<Hash, Arc<Block>>,
}

impl TestChain {
    pub fn new(tip: u64) -> Self {
        let headers = mine_headers([0u8; 32], 0, tip as usize + 1);
        let blocks = headers
            .iter()
            .map(|header| {
                let block = Block::new(*header, vec![header.merkle_root.to_vec()]);
                (header.hash(), Arc::new(block))
            })
            .collect();
        Self { headers, blocks }
    }

    pub fn tip(&self) -> u64 {
        self.headers.len() as u64 - 1
    }

    pub fn hash(&self, height: u64) -> Hash {
        self.headers[height as usize].hash()
    }

    pub fn header(&self, height: u64) -> BlockHeader {
        self.headers[height as usize]
    }

    pub fn block(&self, height: u64) -> Arc<Block> {
        Arc::clone(&self.blocks[&self.hash(height)])
    }

    pub fn checkpoint(&self, height: u64) -> Checkpoint {
        Checkpoint::new(self.hash(height), height)
    }

    /// Configuration strings for checkpoints at `heights`
    pub fn checkpoint_strings(&self, heights: &[u64]) -> Vec<String> {
        heights
            .iter()
            .map(|height| self.checkpoint(*height).to_string())
            .collect()
    }

    /// Headers following `locator` up to and including `stop`, at most `limit`
    fn headers_after(&self, locator: &Hash, stop: &Hash, limit: usize) -> Vec<BlockHeader> {
        let Some(index) = self.headers.iter().position(|h| h.hash() == *locator) else {
            return Vec::new();
        };

        let mut result = Vec::new();
        for header in self.headers.iter().skip(index + 1).take(limit) {
            result.push(*header);
            if header.hash() == *stop {
                break;
            }
        }
        result
    }

    fn block_by_hash(&self, hash: &Hash) -> Option<Arc<Block>> {
        self.blocks.get(hash).cloned()
    }
}

/// In-memory block store that accepts blocks in any order
#[derive(Default)]
pub struct MemoryChain {
    blocks: Mutex<BTreeMap<u64, Hash>>,
    inserts: AtomicUsize,
    rejected_heights: Mutex<HashSet<u64>>,
}

impl MemoryChain {
    /// Store holding the first `height + 1` blocks of `chain`
    pub fn up_to(chain: &TestChain, height: u64) -> Self {
        let store = Self::default();
        {
            let mut blocks = store.blocks.lock().unwrap();
            for h in 0..=height {
                blocks.insert(h, chain.hash(h));
            }
        }
        store
    }

    pub fn reject(&self, height: u64) {
        self.rejected_heights.lock().unwrap().insert(height);
    }

    pub fn hash_at(&self, height: u64) -> Option<Hash> {
        self.blocks.lock().unwrap().get(&height).copied()
    }

    pub fn heights(&self) -> Vec<u64> {
        self.blocks.lock().unwrap().keys().copied().collect()
    }

    /// Successful inserts since construction
    pub fn inserts(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    /// Every height up to the tip of `chain` is stored with the right hash
    pub fn matches(&self, chain: &TestChain) -> bool {
        (0..=chain.tip()).all(|height| self.hash_at(height) == Some(chain.hash(height)))
    }
}

impl ChainAccess for MemoryChain {
    fn insert(&self, block: Arc<Block>, height: u64) -> anyhow::Result<()> {
        if self.rejected_heights.lock().unwrap().contains(&height) {
            return Err(anyhow::anyhow!("block #{} rejected", height));
        }
        let mut blocks = self.blocks.lock().unwrap();
        if blocks.insert(height, block.hash()).is_some() {
            return Err(anyhow::anyhow!("duplicate block #{}", height));
        }
        self.inserts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn last_height(&self) -> anyhow::Result<u64> {
        Ok(self
            .blocks
            .lock()
            .unwrap()
            .keys()
            .next_back()
            .copied()
            .unwrap_or(0))
    }
}

/// How a scripted peer behaves once connected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerBehavior {
    /// Serves headers and blocks correctly
    Honest,
    /// Accepts requests and never answers
    Silent,
    /// Serves headers with a broken link; blocks are honest
    CorruptHeaders,
    /// Serves headers but never blocks
    WithholdBlocks,
    /// Connection attempt fails
    Refuse,
    /// Negotiates a version too old for header sync
    OldVersion,
}

/// Hands out scripted channels, then `fallback` peers once the script is used up
pub struct MockConnector {
    chain: Arc<TestChain>,
    script: Mutex<VecDeque<PeerBehavior>>,
    fallback: PeerBehavior,
    connects: AtomicUsize,
}

impl MockConnector {
    pub fn honest(chain: Arc<TestChain>) -> Self {
        Self::scripted(chain, Vec::new(), PeerBehavior::Honest)
    }

    pub fn scripted(
        chain: Arc<TestChain>,
        script: Vec<PeerBehavior>,
        fallback: PeerBehavior,
    ) -> Self {
        Self {
            chain,
            script: Mutex::new(script.into()),
            fallback,
            connects: AtomicUsize::new(0),
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Connector for MockConnector {
    async fn connect(&self) -> Result<Box<dyn Channel>, SyncError> {
        let id = self.connects.fetch_add(1, Ordering::SeqCst);
        let behavior = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.fallback);

        if behavior == PeerBehavior::Refuse {
            return Err(SyncError::ConnectFailed(format!("peer {} refused", id)));
        }
        Ok(Box::new(MockChannel::new(id, Arc::clone(&self.chain), behavior)))
    }
}

pub struct MockChannel {
    id: usize,
    chain: Arc<TestChain>,
    behavior: PeerBehavior,
    outbound: mpsc::UnboundedSender<SyncMessage>,
    inbound: mpsc::UnboundedReceiver<SyncMessage>,
}

impl MockChannel {
    fn new(id: usize, chain: Arc<TestChain>, behavior: PeerBehavior) -> Self {
        let (outbound, inbound) = mpsc::unbounded_channel();
        Self {
            id,
            chain,
            behavior,
            outbound,
            inbound,
        }
    }

    fn answer_headers(&self, locator: &Hash, stop: &Hash) {
        if matches!(self.behavior, PeerBehavior::Silent) {
            return;
        }

        let mut headers = self.chain.headers_after(locator, stop, MAX_HEADERS_RESULTS);
        if self.behavior == PeerBehavior::CorruptHeaders {
            if let Some(first) = headers.first_mut() {
                first.prev_block_hash = [0xde; 32];
            }
        }
        let _ = self
            .outbound
            .send(SyncMessage::Headers(HeadersMessage { headers }));
    }

    fn answer_blocks(&self, hashes: impl Iterator<Item = Hash>) {
        if matches!(
            self.behavior,
            PeerBehavior::Silent | PeerBehavior::WithholdBlocks
        ) {
            return;
        }
        for hash in hashes {
            if let Some(block) = self.chain.block_by_hash(&hash) {
                let _ = self.outbound.send(SyncMessage::Block(block));
            }
        }
    }
}

#[async_trait::async_trait]
impl Channel for MockChannel {
    fn peer_addr(&self) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 18444 + self.id as u16))
    }

    fn version(&self) -> u32 {
        match self.behavior {
            PeerBehavior::OldVersion => 31402,
            _ => 70015,
        }
    }

    async fn send(&mut self, message: SyncMessage) -> Result<(), SyncError> {
        match message {
            SyncMessage::GetHeaders(request) => {
                if let Some(locator) = request.block_locator_hashes.first() {
                    self.answer_headers(locator, &request.hash_stop);
                }
            }
            SyncMessage::GetData(request) => {
                self.answer_blocks(request.inventory.into_iter().map(|item| item.hash));
            }
            _ => {}
        }
        Ok(())
    }

    async fn recv(&mut self) -> Result<SyncMessage, SyncError> {
        match tokio::time::timeout(TRANSPORT_TIMEOUT, self.inbound.recv()).await {
            Ok(Some(message)) => Ok(message),
            Ok(None) => Err(SyncError::ChannelClosed),
            Err(_) => Err(SyncError::ChannelTimeout),
        }
    }

    async fn close(&mut self) -> Result<(), SyncError> {
        // Old peers have already hung up by the time they are rejected
        match self.behavior {
            PeerBehavior::OldVersion => Err(SyncError::ChannelClosed),
            _ => Ok(()),
        }
    }
}
