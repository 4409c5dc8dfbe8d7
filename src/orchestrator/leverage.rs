use super::{CrossChainArgs, LeverageParams, RequestOrchestrator, RequestOutcome};

use crate::chain::Ctx;
use crate::dispatcher::{CrossChainDispatcher, SwapDispatch};
use crate::error::{ProtocolError, ProtocolResult};
use crate::events::ProtocolEvent;
use crate::external::Environment;
use crate::ledger::{NewRequest, RequestTerms};
use crate::types::{short_id, wad_div, wad_mul, RequestId, RequestKind, WAD};

use alloy_primitives::{Address, U256};
use tracing::info;

/// Collateral and debt gathered before the swap leg
struct LeverageLeg {
    underlying: Address,
    /// Underlying collected from the user
    amount_in: U256,
    /// Synthetic to issue
    debt_amount: U256,
}

impl RequestOrchestrator {
    /// Open or grow a leveraged position.
    ///
    /// Without `cross_chain` the synthetic is swapped on this chain and the
    /// position is settled immediately. With it, the debt is issued
    /// provisionally and sent to `dst_chain_id` for swapping; the position is
    /// completed by [`Self::cross_chain_leverage_callback`].
    pub fn leverage<E: Environment>(
        &self,
        ctx: &mut Ctx<'_, E>,
        dispatcher: &CrossChainDispatcher,
        caller: Address,
        params: &LeverageParams,
        cross_chain: Option<&CrossChainArgs>,
    ) -> ProtocolResult<RequestOutcome> {
        if params.amount_in.is_zero() {
            return Err(ProtocolError::AmountIsZero);
        }
        self.ensure_not_shutdown(ctx)?;

        let collateral_factor = ctx.env.collateral_factor_of(params.deposit_token)?;
        check_leverage(params.leverage, collateral_factor)?;

        let leg = self.collect(ctx, caller, params)?;
        if leg.debt_amount.is_zero() {
            return Err(ProtocolError::AmountIsZero);
        }

        match cross_chain {
            None => self.settle_leverage(ctx, caller, params, leg),
            Some(args) => self.dispatch_leverage(ctx, dispatcher, caller, params, args, leg),
        }
    }

    /// Pull the user's tokens, convert them to the underlying and size the debt
    fn collect<E: Environment>(
        &self,
        ctx: &mut Ctx<'_, E>,
        caller: Address,
        params: &LeverageParams,
    ) -> ProtocolResult<LeverageLeg> {
        let underlying = ctx.env.underlying_of(params.deposit_token)?;
        ctx.env
            .transfer(params.token_in, caller, self.address, params.amount_in)?;

        let amount_in = if params.token_in == underlying {
            params.amount_in
        } else {
            ctx.env.swap_exact_input(
                self.address,
                params.token_in,
                underlying,
                params.amount_in,
                U256::ZERO,
                self.address,
            )?
        };

        let value = ctx
            .env
            .quote(underlying, params.synthetic_token, amount_in)?;
        let debt_amount = wad_mul(value, params.leverage - WAD);

        Ok(LeverageLeg {
            underlying,
            amount_in,
            debt_amount,
        })
    }

    fn settle_leverage<E: Environment>(
        &self,
        ctx: &mut Ctx<'_, E>,
        caller: Address,
        params: &LeverageParams,
        leg: LeverageLeg,
    ) -> ProtocolResult<RequestOutcome> {
        let issued = ctx.env.issue(
            params.synthetic_token,
            leg.debt_amount,
            caller,
            self.address,
        )?;
        let amount_out = ctx.env.swap_exact_input(
            self.address,
            params.synthetic_token,
            leg.underlying,
            issued,
            params.swap_amount_out_min,
            self.address,
        )?;

        let total = leg.amount_in + amount_out;
        if total < params.deposit_amount_min {
            return Err(ProtocolError::LeverageSlippageTooHigh);
        }

        let deposited = ctx
            .env
            .deposit(params.deposit_token, self.address, total, caller)?;
        self.ensure_healthy(ctx, caller)?;

        info!(
            "Leverage settled for {} on chain {}: deposited {}, debt {}",
            caller, ctx.chain_id, deposited, issued
        );

        let chain_id = ctx.chain_id;
        ctx.emit(ProtocolEvent::LeverageSettled {
            chain_id,
            account: caller,
            deposited,
            debt_issued: issued,
        });

        Ok(RequestOutcome::Settled { amount: deposited })
    }

    fn dispatch_leverage<E: Environment>(
        &self,
        ctx: &mut Ctx<'_, E>,
        dispatcher: &CrossChainDispatcher,
        caller: Address,
        params: &LeverageParams,
        args: &CrossChainArgs,
        leg: LeverageLeg,
    ) -> ProtocolResult<RequestOutcome> {
        ctx.config.ensure_bridging_active()?;

        // Debt is recorded now; the callback decides whether it sticks.
        let issued = ctx.env.issue(
            params.synthetic_token,
            leg.debt_amount,
            caller,
            dispatcher.address(),
        )?;

        let request_id = ctx.ledger.register(NewRequest {
            account: caller,
            dst_chain_id: args.dst_chain_id,
            synthetic_token: params.synthetic_token,
            deposit_token: params.deposit_token,
            bridge_token: leg.underlying,
            bound_amount: params.deposit_amount_min,
            terms: RequestTerms::Leverage {
                amount_in: leg.amount_in,
                pending_amount: issued,
            },
        });

        self.fund_dispatcher(ctx, caller, args.native_fee)?;
        let nonce = dispatcher.trigger_leverage_swap(
            ctx,
            &SwapDispatch {
                request_id,
                account: caller,
                dst_chain_id: args.dst_chain_id,
                synthetic_token: params.synthetic_token,
                bridge_token: leg.underlying,
                amount: issued,
                amount_out_min: params.swap_amount_out_min,
                callback_native_fee: args.callback_native_fee,
                native_fee: args.native_fee,
                refund_address: args.refund_address,
            },
        )?;

        info!(
            "Leverage request {} registered for {} on chain {}: {} synthetic to chain {}",
            short_id(&request_id),
            caller,
            ctx.chain_id,
            issued,
            args.dst_chain_id
        );

        let chain_id = ctx.chain_id;
        ctx.emit(ProtocolEvent::RequestRegistered {
            chain_id,
            request_id,
            kind: RequestKind::Leverage,
            account: caller,
            dst_chain_id: args.dst_chain_id,
        });

        Ok(RequestOutcome::Dispatched { request_id, nonce })
    }

    /// Complete a cross-chain leverage with `swap_amount_out` of `token`
    /// returned by the hub. Returns the collateral deposited.
    pub fn cross_chain_leverage_callback<E: Environment>(
        &self,
        ctx: &mut Ctx<'_, E>,
        caller: Address,
        request_id: RequestId,
        token: Address,
        swap_amount_out: U256,
    ) -> ProtocolResult<U256> {
        self.only_dispatcher(caller)?;
        self.ensure_not_shutdown(ctx)?;

        let request = ctx.ledger.get_pending(&request_id)?.clone();
        let RequestTerms::Leverage { amount_in, .. } = request.terms else {
            return Err(ProtocolError::InvalidRequestKey);
        };
        ensure_returned_token(token, request.bridge_token)?;

        if swap_amount_out < request.required_swap_out() {
            return Err(ProtocolError::LeverageSlippageTooHigh);
        }
        let total = amount_in + swap_amount_out;

        ctx.ledger.mark_finished(&request_id)?;

        ctx.env.transfer(
            request.bridge_token,
            self.dispatcher,
            self.address,
            swap_amount_out,
        )?;
        let deposited =
            ctx.env
                .deposit(request.deposit_token, self.address, total, request.account)?;
        self.ensure_healthy(ctx, request.account)?;

        info!(
            "Leverage request {} finished on chain {}: deposited {} for {}",
            short_id(&request_id),
            ctx.chain_id,
            deposited,
            request.account
        );

        let chain_id = ctx.chain_id;
        ctx.emit(ProtocolEvent::RequestFinished {
            chain_id,
            request_id,
            kind: RequestKind::Leverage,
            amount_out: swap_amount_out,
        });

        Ok(deposited)
    }
}

/// A callback must return the token the request is waiting for
pub(super) fn ensure_returned_token(returned: Address, expected: Address) -> ProtocolResult<()> {
    if returned != expected {
        return Err(ProtocolError::InvalidPayload(format!(
            "callback returned {} instead of {}",
            returned, expected
        )));
    }
    Ok(())
}

/// `1.0 < leverage <= 1 / (1 - collateral_factor)`
fn check_leverage(leverage: U256, collateral_factor: U256) -> ProtocolResult<()> {
    if leverage <= WAD {
        return Err(ProtocolError::LeverageTooLow);
    }
    if collateral_factor < WAD && leverage > wad_div(WAD, WAD - collateral_factor) {
        return Err(ProtocolError::LeverageTooHigh);
    }
    Ok(())
}
