use alloy::sol;

sol!(
    #[allow(missing_docs)]
    Erc20,
    "abi/Erc20.json"
);

sol!(
    #[allow(missing_docs)]
    StargateRouter,
    "abi/StargateRouter.json"
);
