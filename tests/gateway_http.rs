use std::sync::Arc;

use crossbot::api::{BitgetClient, BitgetConfig, Credentials, GatewayError, OrderGateway};
use crossbot::execution::{warm_up, SharedMarketState};
use crossbot::models::{OrderSide, PositionSide, TpSlOrder};
use crossbot::strategy::{CrossoverParams, StrategyConfig, StrategyLoop, TickOutcome};
use mockito::{Matcher, Server};
use serde_json::json;
use tokio_test::{assert_err, assert_ok};

const SUCCESS: &str = r#"{"code":"00000","msg":"success","requestTime":1700000000000,"data":{}}"#;

fn client(server: &Server) -> BitgetClient {
    BitgetClient::new(BitgetConfig {
        base_url: server.url(),
        credentials: Credentials::new("key", "secret", "phrase"),
        ..BitgetConfig::default()
    })
    .unwrap()
}

fn signed(mock: mockito::Mock) -> mockito::Mock {
    mock.match_header("ACCESS-KEY", "key")
        .match_header("ACCESS-PASSPHRASE", "phrase")
        .match_header("ACCESS-SIGN", Matcher::Regex(r"^[A-Za-z0-9+/]{43}=$".to_string()))
        .match_header("ACCESS-TIMESTAMP", Matcher::Regex(r"^\d{13}$".to_string()))
        .match_header("content-type", "application/json")
}

#[tokio::test]
async fn test_place_order_request_shape() {
    let mut server = Server::new_async().await;
    let mock = signed(server.mock("POST", "/api/mix/v1/order/placeOrder"))
        .match_body(Matcher::PartialJson(json!({
            "symbol": "BTCUSDT_UMCBL",
            "marginCoin": "USDT",
            "size": "0.001",
            "side": "open_long",
            "orderType": "market"
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"code":"00000","msg":"success","data":{"orderId":"1001","clientOid":"abc"}}"#)
        .create_async()
        .await;

    let order_id = client(&server)
        .place_order("BTCUSDT", OrderSide::OpenLong, 0.001)
        .await;

    assert_eq!(assert_ok!(order_id), "1001");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_set_leverage_request_shape() {
    let mut server = Server::new_async().await;
    let mock = signed(server.mock("POST", "/api/mix/v1/account/setLeverage"))
        .match_body(Matcher::PartialJson(json!({
            "symbol": "BTCUSDT_UMCBL",
            "marginCoin": "USDT",
            "leverage": "10"
        })))
        .with_status(200)
        .with_body(SUCCESS)
        .create_async()
        .await;

    assert_ok!(client(&server).set_leverage("BTCUSDT", 10).await);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_tpsl_places_profit_and_loss_plans() {
    let mut server = Server::new_async().await;
    let profit = signed(server.mock("POST", "/api/mix/v1/plan/placeTPSL"))
        .match_body(Matcher::PartialJson(json!({
            "symbol": "BTCUSDT_UMCBL",
            "planType": "profit_plan",
            "triggerPrice": "102",
            "holdSide": "long"
        })))
        .with_status(200)
        .with_body(SUCCESS)
        .create_async()
        .await;
    let loss = signed(server.mock("POST", "/api/mix/v1/plan/placeTPSL"))
        .match_body(Matcher::PartialJson(json!({
            "symbol": "BTCUSDT_UMCBL",
            "planType": "loss_plan",
            "triggerPrice": "99",
            "holdSide": "long"
        })))
        .with_status(200)
        .with_body(SUCCESS)
        .create_async()
        .await;

    let order = TpSlOrder::anchored(PositionSide::Long, 100.0, 0.02, -0.01);
    assert_ok!(client(&server).place_tpsl("BTCUSDT", &order).await);

    profit.assert_async().await;
    loss.assert_async().await;
}

#[tokio::test]
async fn test_rejection_surfaces_exchange_code() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/mix/v1/order/placeOrder")
        .with_status(400)
        .with_body(r#"{"code":"40762","msg":"The order size is greater than the max open size","data":null}"#)
        .create_async()
        .await;

    let result = client(&server)
        .place_order("BTCUSDT", OrderSide::OpenShort, 0.001)
        .await;

    match assert_err!(result) {
        GatewayError::Rejected { code, .. } => assert_eq!(code, "40762"),
        other => panic!("expected rejection, got {:?}", other),
    }
}

#[tokio::test]
async fn test_tiny_quantity_never_reaches_exchange() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/api/mix/v1/order/placeOrder")
        .expect(0)
        .create_async()
        .await;

    let result = client(&server)
        .place_order("BTCUSDT", OrderSide::OpenLong, 0.0001)
        .await;

    assert!(matches!(result, Err(GatewayError::InvalidRequest(_))));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_fetch_candles_sorted_oldest_first() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/api/mix/v1/market/candles")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("symbol".into(), "BTCUSDT_UMCBL".into()),
            Matcher::UrlEncoded("granularity".into(), "1m".into()),
            Matcher::UrlEncoded("limit".into(), "3".into()),
        ]))
        .with_status(200)
        .with_body(
            r#"[
                ["1700000120000","102","103","101","102.5","10","1000"],
                ["1700000000000","100","101","99","100.5","10","1000"],
                ["1700000060000","101","102","100","101.5","10","1000"]
            ]"#,
        )
        .create_async()
        .await;

    let candles = assert_ok!(client(&server).fetch_candles("BTCUSDT", "1m", 3).await);

    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    assert_eq!(closes, vec![100.5, 101.5, 102.5]);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_warm_up_seeds_buffer() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/api/mix/v1/market/candles")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(
            r#"{"code":"00000","msg":"success","data":[
                ["1700000000000","100","101","99","100","10"],
                ["1700000060000","100","101","99","101","10"],
                ["1700000120000","100","101","99","102","10"],
                ["1700000180000","100","101","99","103","10"]
            ]}"#,
        )
        .create_async()
        .await;

    let state = SharedMarketState::new(3);
    let accepted = warm_up(&client(&server), &state, "BTCUSDT", "1m", 3)
        .await
        .unwrap();

    assert_eq!(accepted, 3);
    assert_eq!(state.buffered_closes(), 3);
    assert_eq!(state.snapshot(3, 3).long_ma, 102.0);
}

#[tokio::test]
async fn test_strategy_tick_against_rest_gateway() {
    let mut server = Server::new_async().await;
    let open = signed(server.mock("POST", "/api/mix/v1/order/placeOrder"))
        .match_body(Matcher::PartialJson(json!({"side": "open_long"})))
        .with_status(200)
        .with_body(r#"{"code":"00000","msg":"success","data":{"orderId":"7"}}"#)
        .expect(1)
        .create_async()
        .await;
    let tpsl = signed(server.mock("POST", "/api/mix/v1/plan/placeTPSL"))
        .with_status(200)
        .with_body(SUCCESS)
        .expect(2)
        .create_async()
        .await;

    let state = SharedMarketState::new(4);
    for price in [100.0, 100.0, 100.0, 101.0] {
        state.record_close(price).unwrap();
    }
    state.set_latest_price(101.0);

    let strategy = StrategyLoop::new(
        StrategyConfig {
            crossover: CrossoverParams {
                short_period: 2,
                long_period: 4,
                min_change_pct: 0.002,
            },
            ..StrategyConfig::default()
        },
        state.clone(),
        Arc::new(client(&server)),
    );

    match strategy.tick().await {
        TickOutcome::Entered {
            order_id,
            tpsl_placed,
            ..
        } => {
            assert_eq!(order_id, "7");
            assert!(tpsl_placed);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(state.position().side, PositionSide::Long);

    open.assert_async().await;
    tpsl.assert_async().await;
}
