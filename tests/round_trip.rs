//! End-to-end request flows across an origin chain and a hub chain

use alloy_primitives::{Address, B256, U256};
use synth_crosschain::chain::{Chain, DeliveryOutcome};
use synth_crosschain::config::Settings;
use synth_crosschain::devnet::{account_address, token_address, units, ChainAddresses, Devnet};
use synth_crosschain::error::{ExternalError, ProtocolError};
use synth_crosschain::events::ProtocolEvent;
use synth_crosschain::external::{Accounting, MessageKey, TokenLedger};
use synth_crosschain::orchestrator::{
    CrossChainArgs, FlashRepayParams, LeverageParams, RequestOutcome,
};
use synth_crosschain::sim::MemoryEnv;
use synth_crosschain::types::{wad_from_f64, RequestId};

const ORIGIN: u64 = 1;
const HUB: u64 = 10;
const GOVERNOR: Address = Address::repeat_byte(0x60);

const CONFIG: &str = r#"
hub_chain_id = 10

[relay]
max_rounds = 8

[fees]
base_fee = 0.001

[[chains]]
chain_id = 1
name = "origin"
governor = "0x6060606060606060606060606060606060606060"
gas_price = 0.000000001

[[chains]]
chain_id = 10
name = "hub"
governor = "0x6060606060606060606060606060606060606060"
gas_price = 0.000000001

[[tokens]]
symbol = "USDC"
kind = "collateral"
price_usd = 1.0
bridge_pool_id = 1

[[tokens]]
symbol = "msUSDC"
kind = "deposit"
price_usd = 1.0

[[tokens]]
symbol = "msUSD"
kind = "synthetic"
price_usd = 1.0

[[markets]]
deposit_token = "msUSDC"
underlying = "USDC"
collateral_factor = 0.5

[[rates]]
token_in = "msUSD"
token_out = "USDC"
rate = 1.0

[[rates]]
token_in = "USDC"
token_out = "msUSD"
rate = 1.0

[[accounts]]
name = "alice"
chain_id = 1
native = 1.0
balances = { USDC = 1000.0 }
"#;

fn devnet() -> Devnet {
    let settings = Settings::from_toml(CONFIG).unwrap();
    Devnet::build(&settings).unwrap()
}

fn alice() -> Address {
    account_address("alice")
}

fn mallory() -> Address {
    account_address("mallory")
}

fn usdc() -> Address {
    token_address("USDC")
}

fn msusdc() -> Address {
    token_address("msUSDC")
}

fn msusd() -> Address {
    token_address("msUSD")
}

fn leverage(amount_in: f64, swap_amount_out_min: f64, deposit_amount_min: f64) -> LeverageParams {
    LeverageParams {
        token_in: usdc(),
        deposit_token: msusdc(),
        synthetic_token: msusd(),
        amount_in: units(amount_in),
        leverage: wad_from_f64(1.5),
        swap_amount_out_min: units(swap_amount_out_min),
        deposit_amount_min: units(deposit_amount_min),
    }
}

fn flash_repay(withdraw_amount: f64, repay_amount_min: f64) -> FlashRepayParams {
    FlashRepayParams {
        synthetic_token: msusd(),
        deposit_token: msusdc(),
        withdraw_amount: units(withdraw_amount),
        swap_amount_out_min: units(repay_amount_min),
        repay_amount_min: units(repay_amount_min),
    }
}

fn leverage_args(chain: &Chain<MemoryEnv>) -> CrossChainArgs {
    let quote = chain.quote_leverage_fee(HUB).unwrap();
    CrossChainArgs {
        dst_chain_id: HUB,
        native_fee: quote.native_fee,
        callback_native_fee: quote.callback_native_fee,
        refund_address: alice(),
    }
}

fn flash_repay_args(chain: &Chain<MemoryEnv>) -> CrossChainArgs {
    let quote = chain.quote_flash_repay_fee(HUB).unwrap();
    CrossChainArgs {
        dst_chain_id: HUB,
        native_fee: quote.native_fee,
        callback_native_fee: quote.callback_native_fee,
        refund_address: alice(),
    }
}

/// Start a cross-chain leverage of 100 USDC at 1.5x from the origin chain
async fn dispatch_leverage(
    devnet: &Devnet,
    swap_amount_out_min: f64,
    deposit_amount_min: f64,
) -> RequestId {
    let origin = devnet.engine.chain(ORIGIN).unwrap();
    let mut chain = origin.lock().await;
    let args = leverage_args(&chain);
    chain
        .leverage(
            alice(),
            &leverage(100.0, swap_amount_out_min, deposit_amount_min),
            Some(&args),
        )
        .unwrap()
        .request_id()
        .unwrap()
}

async fn only_cached_key(devnet: &Devnet, chain_id: u64) -> MessageKey {
    let handle = devnet.engine.chain(chain_id).unwrap();
    let chain = handle.lock().await;
    let keys = chain.env().cached_keys();
    assert_eq!(keys.len(), 1, "expected one cached message on chain {}", chain_id);
    keys[0]
}

#[tokio::test]
async fn local_leverage_settles_without_ledger_entry() {
    let devnet = devnet();
    let origin = devnet.engine.chain(ORIGIN).unwrap();
    let mut chain = origin.lock().await;

    let outcome = chain
        .leverage(alice(), &leverage(100.0, 50.0, 150.0), None)
        .unwrap();

    assert_eq!(outcome, RequestOutcome::Settled { amount: units(150.0) });
    assert_eq!(chain.env().deposit_of(alice(), msusdc()), units(150.0));
    assert_eq!(chain.env().debt_of(alice(), msusd()), units(50.0));
    assert_eq!(chain.env().balance_of(usdc(), alice()), units(900.0));
    assert!(chain.ledger().is_empty());
    assert!(chain.env().endpoint().outbox().is_empty());
}

#[tokio::test]
async fn cross_chain_leverage_registers_then_completes() {
    let devnet = devnet();
    let request_id = dispatch_leverage(&devnet, 49.0, 148.0).await;

    {
        let origin = devnet.engine.chain(ORIGIN).unwrap();
        let chain = origin.lock().await;
        let request = chain.ledger().get(&request_id).unwrap();
        assert_eq!(request.pending_amount(), units(50.0));
        assert!(!request.finished);
        assert_eq!(chain.env().debt_of(alice(), msusd()), units(50.0));
        assert_eq!(chain.env().deposit_of(alice(), msusdc()), U256::ZERO);

        let outbox = chain.env().endpoint().outbox();
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox[0].dst_chain_id, HUB);
        assert_eq!(outbox[0].dst_address, ChainAddresses::for_chain(HUB).dispatcher);
    }

    let stats = devnet.engine.run_until_idle().await.unwrap();
    assert_eq!(stats.totals.delivered, 2);
    assert_eq!(stats.totals.retained, 0);

    let origin = devnet.engine.chain(ORIGIN).unwrap();
    let chain = origin.lock().await;
    assert!(chain.ledger().get(&request_id).unwrap().finished);
    assert_eq!(chain.env().deposit_of(alice(), msusdc()), units(150.0));
    assert_eq!(chain.env().debt_of(alice(), msusd()), units(50.0));
    assert!(chain.env().debt_position_of(alice()).unwrap().is_healthy);
}

#[tokio::test]
async fn callback_below_bound_is_rejected_and_request_stays_pending() {
    let devnet = devnet();
    let request_id = dispatch_leverage(&devnet, 0.0, 148.0).await;
    let dispatcher = ChainAddresses::for_chain(ORIGIN).dispatcher;

    let origin = devnet.engine.chain(ORIGIN).unwrap();
    let mut chain = origin.lock().await;

    assert_eq!(
        chain
            .cross_chain_leverage_callback(mallory(), request_id, usdc(), units(48.0))
            .unwrap_err(),
        ProtocolError::SenderIsNotCrossChainDispatcher
    );
    assert_eq!(
        chain
            .cross_chain_leverage_callback(dispatcher, request_id, usdc(), units(45.0))
            .unwrap_err(),
        ProtocolError::LeverageSlippageTooHigh
    );
    assert!(!chain.ledger().get(&request_id).unwrap().finished);
}

#[tokio::test]
async fn second_callback_fails_and_balances_change_once() {
    let devnet = devnet();
    let request_id = dispatch_leverage(&devnet, 0.0, 148.0).await;
    let dispatcher = ChainAddresses::for_chain(ORIGIN).dispatcher;

    let origin = devnet.engine.chain(ORIGIN).unwrap();
    let mut chain = origin.lock().await;
    chain
        .env_mut()
        .mint(usdc(), dispatcher, units(96.0))
        .unwrap();

    let deposited = chain
        .cross_chain_leverage_callback(dispatcher, request_id, usdc(), units(48.0))
        .unwrap();
    assert_eq!(deposited, units(148.0));

    assert_eq!(
        chain
            .cross_chain_leverage_callback(dispatcher, request_id, usdc(), units(48.0))
            .unwrap_err(),
        ProtocolError::RequestAlreadyCompleted
    );
    assert_eq!(chain.env().deposit_of(alice(), msusdc()), units(148.0));
    assert_eq!(chain.env().balance_of(usdc(), dispatcher), units(48.0));
}

#[tokio::test]
async fn spoofed_source_address_is_dropped() {
    let devnet = devnet();
    dispatch_leverage(&devnet, 49.0, 148.0).await;

    let mut envelope = {
        let origin = devnet.engine.chain(ORIGIN).unwrap();
        let mut chain = origin.lock().await;
        chain.take_outbox().remove(0)
    };
    envelope.src_address = mallory();

    let hub = devnet.engine.chain(HUB).unwrap();
    let mut chain = hub.lock().await;
    assert_eq!(
        chain.deliver(envelope.clone()),
        DeliveryOutcome::Dropped {
            error: ProtocolError::InvalidFromAddress { chain_id: ORIGIN }
        }
    );
    assert!(chain.env().cached_keys().is_empty());
    assert!(chain.env().endpoint().outbox().is_empty());

    // Only the transport may invoke the inbound handler
    envelope.src_address = ChainAddresses::for_chain(ORIGIN).dispatcher;
    assert_eq!(
        chain.receive(mallory(), &envelope).unwrap_err(),
        ProtocolError::InvalidMsgSender
    );
}

#[tokio::test]
async fn failed_callback_is_retried_by_the_account_with_a_lower_bound() {
    let devnet = devnet();
    {
        let hub = devnet.engine.chain(HUB).unwrap();
        hub.lock()
            .await
            .env_mut()
            .set_rate(msusd(), usdc(), wad_from_f64(0.9));
    }
    let request_id = dispatch_leverage(&devnet, 0.0, 148.0).await;

    let stats = devnet.engine.run_until_idle().await.unwrap();
    assert_eq!(stats.totals.delivered, 1);
    assert_eq!(stats.totals.retained, 1);

    let key = only_cached_key(&devnet, ORIGIN).await;
    let origin = devnet.engine.chain(ORIGIN).unwrap();
    let mut chain = origin.lock().await;
    assert!(!chain.ledger().get(&request_id).unwrap().finished);

    assert_eq!(
        chain.retry_callback(mallory(), key, units(140.0)).unwrap_err(),
        ProtocolError::InvalidMsgSender
    );
    assert_eq!(chain.ledger().get(&request_id).unwrap().bound_amount, units(148.0));

    // A bound still above the swap result fails and changes nothing
    assert_eq!(
        chain.retry_callback(alice(), key, units(146.0)).unwrap_err(),
        ProtocolError::LeverageSlippageTooHigh
    );
    assert_eq!(chain.ledger().get(&request_id).unwrap().bound_amount, units(148.0));
    assert_eq!(chain.env().cached_keys(), vec![key]);

    chain.retry_callback(alice(), key, units(145.0)).unwrap();

    let request = chain.ledger().get(&request_id).unwrap();
    assert!(request.finished);
    assert_eq!(request.bound_amount, units(145.0));
    assert_eq!(chain.env().deposit_of(alice(), msusdc()), units(145.0));
    assert!(chain.env().cached_keys().is_empty());
    assert!(chain.events().iter().any(|e| matches!(
        e,
        ProtocolEvent::BoundUpdated { previous, bound, .. }
            if *previous == units(148.0) && *bound == units(145.0)
    )));
    assert!(chain
        .events()
        .iter()
        .any(|e| matches!(e, ProtocolEvent::MessageRetried { .. })));
}

#[tokio::test]
async fn failed_swap_is_retried_on_the_hub_by_the_account() {
    let devnet = devnet();
    {
        let hub = devnet.engine.chain(HUB).unwrap();
        hub.lock()
            .await
            .env_mut()
            .set_rate(msusd(), usdc(), wad_from_f64(0.9));
    }
    let request_id = dispatch_leverage(&devnet, 49.0, 140.0).await;

    let stats = devnet.engine.run_until_idle().await.unwrap();
    assert_eq!(stats.totals.retained, 1);

    let key = only_cached_key(&devnet, HUB).await;
    {
        let hub = devnet.engine.chain(HUB).unwrap();
        let mut chain = hub.lock().await;
        assert_eq!(
            chain.retry_swap(mallory(), key, units(44.0)).unwrap_err(),
            ProtocolError::InvalidMsgSender
        );
        assert_eq!(chain.env().cached_keys(), vec![key]);

        chain.retry_swap(alice(), key, units(44.0)).unwrap();
        assert!(chain.env().cached_keys().is_empty());
        assert_eq!(chain.env().endpoint().outbox().len(), 1);
    }

    devnet.engine.run_until_idle().await.unwrap();

    let origin = devnet.engine.chain(ORIGIN).unwrap();
    let chain = origin.lock().await;
    assert!(chain.ledger().get(&request_id).unwrap().finished);
    assert_eq!(chain.env().deposit_of(alice(), msusdc()), units(145.0));
}

#[tokio::test]
async fn paused_hub_retains_and_anyone_may_replay() {
    let devnet = devnet();
    {
        let hub = devnet.engine.chain(HUB).unwrap();
        hub.lock()
            .await
            .govern(|g| g.toggle_bridging_is_active(GOVERNOR))
            .unwrap();
    }
    let request_id = dispatch_leverage(&devnet, 49.0, 148.0).await;

    let stats = devnet.engine.run_until_idle().await.unwrap();
    assert_eq!(stats.totals.retained, 1);

    let key = only_cached_key(&devnet, HUB).await;
    {
        let hub = devnet.engine.chain(HUB).unwrap();
        let mut chain = hub.lock().await;
        assert_eq!(
            chain.replay(mallory(), key).unwrap_err(),
            ProtocolError::BridgingIsPaused
        );
        assert_eq!(chain.env().cached_keys(), vec![key]);

        chain
            .govern(|g| g.toggle_bridging_is_active(GOVERNOR))
            .unwrap();
        chain.replay(mallory(), key).unwrap();
        assert_eq!(
            chain.replay(mallory(), key).unwrap_err(),
            ProtocolError::MessageNotCached {
                src_chain_id: ORIGIN,
                nonce: key.nonce
            }
        );
    }

    devnet.engine.run_until_idle().await.unwrap();

    let origin = devnet.engine.chain(ORIGIN).unwrap();
    let chain = origin.lock().await;
    assert!(chain.ledger().get(&request_id).unwrap().finished);
}

#[tokio::test]
async fn underpaid_fee_rolls_back_the_whole_request() {
    let devnet = devnet();
    let origin = devnet.engine.chain(ORIGIN).unwrap();
    let mut chain = origin.lock().await;

    let native_before = chain.env().native_balance_of(alice());
    let mut args = leverage_args(&chain);
    args.native_fee = U256::from(1);

    let err = chain
        .leverage(alice(), &leverage(100.0, 49.0, 148.0), Some(&args))
        .unwrap_err();
    assert!(matches!(
        err,
        ProtocolError::External(ExternalError::InsufficientFee { .. })
    ));

    assert!(chain.ledger().is_empty());
    assert_eq!(chain.env().balance_of(usdc(), alice()), units(1000.0));
    assert_eq!(chain.env().debt_of(alice(), msusd()), U256::ZERO);
    assert_eq!(chain.env().native_balance_of(alice()), native_before);
    assert!(chain.env().endpoint().outbox().is_empty());
    assert!(!chain
        .events()
        .iter()
        .any(|e| matches!(e, ProtocolEvent::RequestRegistered { .. })));
}

#[tokio::test]
async fn leverage_bounds_and_health_are_enforced() {
    let devnet = devnet();
    let origin = devnet.engine.chain(ORIGIN).unwrap();
    let mut chain = origin.lock().await;

    let mut params = leverage(100.0, 0.0, 0.0);
    params.leverage = wad_from_f64(2.5);
    assert_eq!(
        chain.leverage(alice(), &params, None).unwrap_err(),
        ProtocolError::LeverageTooHigh
    );

    params.leverage = wad_from_f64(1.0);
    assert_eq!(
        chain.leverage(alice(), &params, None).unwrap_err(),
        ProtocolError::LeverageTooLow
    );

    // At the maximum leverage any swap loss leaves the position unhealthy
    chain
        .env_mut()
        .set_rate(msusd(), usdc(), wad_from_f64(0.99));
    params.leverage = wad_from_f64(2.0);
    assert_eq!(
        chain.leverage(alice(), &params, None).unwrap_err(),
        ProtocolError::PositionIsNotHealthy
    );
    assert_eq!(chain.env().debt_of(alice(), msusd()), U256::ZERO);
    assert_eq!(chain.env().balance_of(usdc(), alice()), units(1000.0));

    chain.env_mut().set_shutdown(true);
    assert_eq!(
        chain.leverage(alice(), &params, None).unwrap_err(),
        ProtocolError::IsShutdown
    );
}

#[tokio::test]
async fn flash_repay_locally_and_across_chains() {
    let devnet = devnet();
    let origin = devnet.engine.chain(ORIGIN).unwrap();

    {
        let mut chain = origin.lock().await;
        chain
            .leverage(alice(), &leverage(100.0, 50.0, 150.0), None)
            .unwrap();

        assert_eq!(
            chain.flash_repay(alice(), &flash_repay(60.0, 0.0), None).unwrap_err(),
            ProtocolError::AmountIsTooHigh
        );

        let outcome = chain
            .flash_repay(alice(), &flash_repay(20.0, 20.0), None)
            .unwrap();
        assert_eq!(outcome, RequestOutcome::Settled { amount: units(20.0) });
        assert_eq!(chain.env().debt_of(alice(), msusd()), units(30.0));
        assert_eq!(chain.env().deposit_of(alice(), msusdc()), units(130.0));

        let args = flash_repay_args(&chain);
        chain
            .flash_repay(alice(), &flash_repay(10.0, 10.0), Some(&args))
            .unwrap();
    }

    devnet.engine.run_until_idle().await.unwrap();

    let chain = origin.lock().await;
    assert_eq!(chain.env().debt_of(alice(), msusd()), units(20.0));
    assert_eq!(chain.env().deposit_of(alice(), msusdc()), units(120.0));
    assert_eq!(chain.ledger().stats().finished, 1);
}

#[tokio::test]
async fn cross_chain_flash_repay_respects_the_pause_flag() {
    let devnet = devnet();
    let origin = devnet.engine.chain(ORIGIN).unwrap();
    let mut chain = origin.lock().await;

    chain
        .leverage(alice(), &leverage(100.0, 50.0, 150.0), None)
        .unwrap();
    chain
        .govern(|g| g.toggle_flash_repay_is_active(GOVERNOR))
        .unwrap();

    let args = flash_repay_args(&chain);
    assert_eq!(
        chain
            .flash_repay(alice(), &flash_repay(10.0, 10.0), Some(&args))
            .unwrap_err(),
        ProtocolError::CrossChainFlashRepayInactive
    );
    assert!(chain
        .flash_repay(alice(), &flash_repay(10.0, 10.0), None)
        .is_ok());
}

#[tokio::test]
async fn callback_with_the_wrong_token_is_rejected() {
    let devnet = devnet();
    let request_id = dispatch_leverage(&devnet, 0.0, 148.0).await;
    let dispatcher = ChainAddresses::for_chain(ORIGIN).dispatcher;

    let origin = devnet.engine.chain(ORIGIN).unwrap();
    let mut chain = origin.lock().await;
    chain.env_mut().mint(usdc(), dispatcher, units(48.0)).unwrap();
    chain.env_mut().mint(msusd(), dispatcher, units(48.0)).unwrap();

    let err = chain
        .cross_chain_leverage_callback(dispatcher, request_id, msusd(), units(48.0))
        .unwrap_err();
    assert!(matches!(err, ProtocolError::InvalidPayload(_)));
    assert!(!chain.ledger().get(&request_id).unwrap().finished);
    assert_eq!(chain.env().deposit_of(alice(), msusdc()), U256::ZERO);
    assert_eq!(chain.env().balance_of(usdc(), dispatcher), units(48.0));

    let err = chain
        .cross_chain_flash_repay_callback(dispatcher, request_id, msusd(), units(48.0))
        .unwrap_err();
    assert_eq!(err, ProtocolError::InvalidRequestKey);
}

#[tokio::test]
async fn relayed_callback_carrying_another_token_is_dropped() {
    let devnet = devnet();
    let request_id = dispatch_leverage(&devnet, 49.0, 148.0).await;

    let swap = {
        let origin = devnet.engine.chain(ORIGIN).unwrap();
        let mut chain = origin.lock().await;
        chain.take_outbox().remove(0)
    };
    let mut callback = {
        let hub = devnet.engine.chain(HUB).unwrap();
        let mut chain = hub.lock().await;
        assert_eq!(chain.deliver(swap), DeliveryOutcome::Delivered);
        chain.take_outbox().remove(0)
    };
    let mut token = callback.token.unwrap();
    assert_eq!(token.token, usdc());
    token.token = msusd();
    callback.token = Some(token);

    let origin = devnet.engine.chain(ORIGIN).unwrap();
    let mut chain = origin.lock().await;
    let outcome = chain.deliver(callback);
    assert!(matches!(
        outcome,
        DeliveryOutcome::Dropped {
            error: ProtocolError::InvalidPayload(_)
        }
    ));
    assert!(chain.env().cached_keys().is_empty());
    assert!(!chain.ledger().get(&request_id).unwrap().finished);
    assert_eq!(chain.env().deposit_of(alice(), msusdc()), U256::ZERO);
}

#[tokio::test]
async fn unhealthy_callback_leaves_the_request_pending() {
    let devnet = devnet();
    let dispatcher = ChainAddresses::for_chain(ORIGIN).dispatcher;
    let origin = devnet.engine.chain(ORIGIN).unwrap();
    let mut chain = origin.lock().await;

    let mut params = leverage(100.0, 0.0, 0.0);
    params.leverage = wad_from_f64(2.0);
    let args = leverage_args(&chain);
    let request_id = chain
        .leverage(alice(), &params, Some(&args))
        .unwrap()
        .request_id()
        .unwrap();
    assert_eq!(chain.env().debt_of(alice(), msusd()), units(100.0));

    // Half the debt back: 150 deposited supports only 75 of debt
    chain.env_mut().mint(usdc(), dispatcher, units(50.0)).unwrap();
    assert_eq!(
        chain
            .cross_chain_leverage_callback(dispatcher, request_id, usdc(), units(50.0))
            .unwrap_err(),
        ProtocolError::PositionIsNotHealthy
    );

    assert!(!chain.ledger().get(&request_id).unwrap().finished);
    assert_eq!(chain.env().deposit_of(alice(), msusdc()), U256::ZERO);
    assert_eq!(chain.env().balance_of(usdc(), dispatcher), units(50.0));
}

#[tokio::test]
async fn swap_routed_back_to_the_origin_completes_in_place() {
    let devnet = devnet();
    let origin = devnet.engine.chain(ORIGIN).unwrap();

    let request_id = {
        let mut chain = origin.lock().await;
        let own_dispatcher = ChainAddresses::for_chain(ORIGIN).dispatcher;
        chain
            .govern(|g| g.set_trusted_route(GOVERNOR, ORIGIN, own_dispatcher))
            .unwrap();

        let quote = chain.quote_leverage_fee(ORIGIN).unwrap();
        let args = CrossChainArgs {
            dst_chain_id: ORIGIN,
            native_fee: quote.native_fee,
            callback_native_fee: quote.callback_native_fee,
            refund_address: alice(),
        };
        chain
            .leverage(alice(), &leverage(100.0, 49.0, 148.0), Some(&args))
            .unwrap()
            .request_id()
            .unwrap()
    };

    let stats = devnet.engine.run_until_idle().await.unwrap();
    assert_eq!(stats.totals.delivered, 1);
    assert_eq!(stats.totals.retained, 0);

    let chain = origin.lock().await;
    assert!(chain.ledger().get(&request_id).unwrap().finished);
    assert_eq!(chain.env().deposit_of(alice(), msusdc()), units(150.0));
    assert_eq!(chain.env().debt_of(alice(), msusd()), units(50.0));
    assert!(chain.env().endpoint().outbox().is_empty());
}

#[tokio::test]
async fn outbound_requests_need_an_active_route_and_bridging() {
    let devnet = devnet();
    let origin = devnet.engine.chain(ORIGIN).unwrap();
    let mut chain = origin.lock().await;
    let params = leverage(100.0, 49.0, 148.0);

    let mut args = leverage_args(&chain);
    args.dst_chain_id = 99;
    assert_eq!(
        chain.leverage(alice(), &params, Some(&args)).unwrap_err(),
        ProtocolError::DestinationChainNotAllowed { chain_id: 99 }
    );

    let args = leverage_args(&chain);
    chain
        .govern(|g| g.toggle_route_is_active(GOVERNOR, HUB))
        .unwrap();
    assert_eq!(
        chain.leverage(alice(), &params, Some(&args)).unwrap_err(),
        ProtocolError::DestinationChainNotAllowed { chain_id: HUB }
    );
    chain
        .govern(|g| g.toggle_route_is_active(GOVERNOR, HUB))
        .unwrap();

    chain
        .govern(|g| g.toggle_bridging_is_active(GOVERNOR))
        .unwrap();
    assert_eq!(
        chain.leverage(alice(), &params, Some(&args)).unwrap_err(),
        ProtocolError::BridgingIsPaused
    );

    assert!(chain.ledger().is_empty());
    assert_eq!(chain.env().debt_of(alice(), msusd()), U256::ZERO);
    assert_eq!(chain.env().balance_of(usdc(), alice()), units(1000.0));
    assert!(chain.env().endpoint().outbox().is_empty());
}

#[tokio::test]
async fn flash_repay_below_its_bound_is_rejected() {
    let devnet = devnet();
    let dispatcher = ChainAddresses::for_chain(ORIGIN).dispatcher;
    let origin = devnet.engine.chain(ORIGIN).unwrap();
    let mut chain = origin.lock().await;

    chain
        .leverage(alice(), &leverage(100.0, 50.0, 150.0), None)
        .unwrap();

    chain
        .env_mut()
        .set_rate(usdc(), msusd(), wad_from_f64(0.9));
    let mut params = flash_repay(20.0, 20.0);
    params.swap_amount_out_min = U256::ZERO;
    assert_eq!(
        chain.flash_repay(alice(), &params, None).unwrap_err(),
        ProtocolError::FlashRepaySlippageTooHigh
    );
    assert_eq!(chain.env().debt_of(alice(), msusd()), units(50.0));
    assert_eq!(chain.env().deposit_of(alice(), msusdc()), units(150.0));

    let args = flash_repay_args(&chain);
    let request_id = chain
        .flash_repay(alice(), &flash_repay(10.0, 10.0), Some(&args))
        .unwrap()
        .request_id()
        .unwrap();

    chain.env_mut().mint(msusd(), dispatcher, units(9.0)).unwrap();
    assert_eq!(
        chain
            .cross_chain_flash_repay_callback(dispatcher, request_id, msusd(), units(9.0))
            .unwrap_err(),
        ProtocolError::FlashRepaySlippageTooHigh
    );
    assert!(!chain.ledger().get(&request_id).unwrap().finished);
    assert_eq!(chain.env().debt_of(alice(), msusd()), units(50.0));
}

#[tokio::test]
async fn callbacks_fail_on_shutdown_and_unknown_requests() {
    let devnet = devnet();
    let request_id = dispatch_leverage(&devnet, 0.0, 148.0).await;
    let dispatcher = ChainAddresses::for_chain(ORIGIN).dispatcher;

    let origin = devnet.engine.chain(ORIGIN).unwrap();
    let mut chain = origin.lock().await;
    chain.env_mut().mint(usdc(), dispatcher, units(48.0)).unwrap();

    let unknown = B256::repeat_byte(7);
    assert_eq!(
        chain
            .cross_chain_leverage_callback(dispatcher, unknown, usdc(), units(48.0))
            .unwrap_err(),
        ProtocolError::InvalidRequestKey
    );
    assert_eq!(
        chain
            .cross_chain_flash_repay_callback(dispatcher, unknown, msusd(), units(48.0))
            .unwrap_err(),
        ProtocolError::InvalidRequestKey
    );

    chain.env_mut().set_shutdown(true);
    assert_eq!(
        chain
            .cross_chain_leverage_callback(dispatcher, request_id, usdc(), units(48.0))
            .unwrap_err(),
        ProtocolError::IsShutdown
    );
    assert_eq!(
        chain
            .cross_chain_flash_repay_callback(dispatcher, request_id, msusd(), units(48.0))
            .unwrap_err(),
        ProtocolError::IsShutdown
    );
    assert!(!chain.ledger().get(&request_id).unwrap().finished);

    chain.env_mut().set_shutdown(false);
    assert_eq!(
        chain
            .cross_chain_leverage_callback(dispatcher, request_id, usdc(), units(48.0))
            .unwrap(),
        units(148.0)
    );
}
