use super::leverage::ensure_returned_token;
use super::{CrossChainArgs, FlashRepayParams, RequestOrchestrator, RequestOutcome};

use crate::chain::Ctx;
use crate::dispatcher::{CrossChainDispatcher, SwapDispatch};
use crate::error::{ProtocolError, ProtocolResult};
use crate::events::ProtocolEvent;
use crate::external::Environment;
use crate::ledger::{NewRequest, RequestTerms};
use crate::types::{short_id, RequestId, RequestKind};

use alloy_primitives::{Address, U256};
use tracing::{debug, info};

impl RequestOrchestrator {
    /// Pay down debt with the account's own collateral.
    ///
    /// The withdrawn underlying is swapped into synthetic, either here or on
    /// `dst_chain_id`, and used to repay. Whatever exceeds the debt goes back
    /// to the account as synthetic.
    pub fn flash_repay<E: Environment>(
        &self,
        ctx: &mut Ctx<'_, E>,
        dispatcher: &CrossChainDispatcher,
        caller: Address,
        params: &FlashRepayParams,
        cross_chain: Option<&CrossChainArgs>,
    ) -> ProtocolResult<RequestOutcome> {
        if params.withdraw_amount.is_zero() {
            return Err(ProtocolError::AmountIsZero);
        }
        self.ensure_not_shutdown(ctx)?;
        if cross_chain.is_some() {
            ctx.config.ensure_flash_repay_active()?;
        }

        let unlocked = ctx
            .env
            .unlocked_balance_of(caller, params.deposit_token);
        if params.withdraw_amount > unlocked {
            return Err(ProtocolError::AmountIsTooHigh);
        }

        match cross_chain {
            None => self.settle_flash_repay(ctx, caller, params),
            Some(args) => self.dispatch_flash_repay(ctx, dispatcher, caller, params, args),
        }
    }

    fn settle_flash_repay<E: Environment>(
        &self,
        ctx: &mut Ctx<'_, E>,
        caller: Address,
        params: &FlashRepayParams,
    ) -> ProtocolResult<RequestOutcome> {
        let underlying = ctx.env.underlying_of(params.deposit_token)?;
        let withdrawn = ctx.env.withdraw(
            params.deposit_token,
            caller,
            params.withdraw_amount,
            self.address,
        )?;
        let amount_out = ctx.env.swap_exact_input(
            self.address,
            underlying,
            params.synthetic_token,
            withdrawn,
            params.swap_amount_out_min,
            self.address,
        )?;

        if amount_out < params.repay_amount_min {
            return Err(ProtocolError::FlashRepaySlippageTooHigh);
        }

        let repaid = self.repay_and_refund(ctx, caller, params.synthetic_token, amount_out)?;
        self.ensure_healthy(ctx, caller)?;

        info!(
            "Flash repay settled for {} on chain {}: withdrew {}, repaid {}",
            caller, ctx.chain_id, withdrawn, repaid
        );

        let chain_id = ctx.chain_id;
        ctx.emit(ProtocolEvent::FlashRepaySettled {
            chain_id,
            account: caller,
            withdrawn,
            repaid,
        });

        Ok(RequestOutcome::Settled { amount: repaid })
    }

    fn dispatch_flash_repay<E: Environment>(
        &self,
        ctx: &mut Ctx<'_, E>,
        dispatcher: &CrossChainDispatcher,
        caller: Address,
        params: &FlashRepayParams,
        args: &CrossChainArgs,
    ) -> ProtocolResult<RequestOutcome> {
        ctx.config.ensure_bridging_active()?;

        let underlying = ctx.env.underlying_of(params.deposit_token)?;
        let withdrawn = ctx.env.withdraw(
            params.deposit_token,
            caller,
            params.withdraw_amount,
            dispatcher.address(),
        )?;

        let request_id = ctx.ledger.register(NewRequest {
            account: caller,
            dst_chain_id: args.dst_chain_id,
            synthetic_token: params.synthetic_token,
            deposit_token: params.deposit_token,
            bridge_token: underlying,
            bound_amount: params.repay_amount_min,
            terms: RequestTerms::FlashRepay {
                withdrawn_amount: withdrawn,
            },
        });

        self.fund_dispatcher(ctx, caller, args.native_fee)?;
        let nonce = dispatcher.trigger_flash_repay_swap(
            ctx,
            &SwapDispatch {
                request_id,
                account: caller,
                dst_chain_id: args.dst_chain_id,
                synthetic_token: params.synthetic_token,
                bridge_token: underlying,
                amount: withdrawn,
                amount_out_min: params.swap_amount_out_min,
                callback_native_fee: args.callback_native_fee,
                native_fee: args.native_fee,
                refund_address: args.refund_address,
            },
        )?;

        info!(
            "Flash repay request {} registered for {} on chain {}: {} collateral to chain {}",
            short_id(&request_id),
            caller,
            ctx.chain_id,
            withdrawn,
            args.dst_chain_id
        );

        let chain_id = ctx.chain_id;
        ctx.emit(ProtocolEvent::RequestRegistered {
            chain_id,
            request_id,
            kind: RequestKind::FlashRepay,
            account: caller,
            dst_chain_id: args.dst_chain_id,
        });

        Ok(RequestOutcome::Dispatched { request_id, nonce })
    }

    /// Complete a cross-chain flash repay with `swap_amount_out` of `token`
    /// returned by the hub. Returns the debt repaid.
    pub fn cross_chain_flash_repay_callback<E: Environment>(
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
        if !matches!(request.terms, RequestTerms::FlashRepay { .. }) {
            return Err(ProtocolError::InvalidRequestKey);
        }
        ensure_returned_token(token, request.synthetic_token)?;
        if swap_amount_out < request.required_swap_out() {
            return Err(ProtocolError::FlashRepaySlippageTooHigh);
        }

        ctx.ledger.mark_finished(&request_id)?;

        ctx.env.transfer(
            request.synthetic_token,
            self.dispatcher,
            self.address,
            swap_amount_out,
        )?;
        let repaid = self.repay_and_refund(
            ctx,
            request.account,
            request.synthetic_token,
            swap_amount_out,
        )?;

        info!(
            "Flash repay request {} finished on chain {}: repaid {} for {}",
            short_id(&request_id),
            ctx.chain_id,
            repaid,
            request.account
        );

        let chain_id = ctx.chain_id;
        ctx.emit(ProtocolEvent::RequestFinished {
            chain_id,
            request_id,
            kind: RequestKind::FlashRepay,
            amount_out: swap_amount_out,
        });

        Ok(repaid)
    }

    /// Repay up to the outstanding debt from the orchestrator's synthetic and
    /// hand the rest to the account
    fn repay_and_refund<E: Environment>(
        &self,
        ctx: &mut Ctx<'_, E>,
        account: Address,
        synthetic: Address,
        amount: U256,
    ) -> ProtocolResult<U256> {
        let debt = ctx.env.debt_of(account, synthetic);
        let to_repay = amount.min(debt);

        let repaid = if to_repay.is_zero() {
            U256::ZERO
        } else {
            ctx.env.repay(synthetic, self.address, account, to_repay)?
        };

        let remainder = amount - repaid;
        if !remainder.is_zero() {
            debug!("Returning {} surplus synthetic to {}", remainder, account);
            ctx.env
                .transfer(synthetic, self.address, account, remainder)?;
        }

        Ok(repaid)
    }
}
